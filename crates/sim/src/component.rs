//! Arena-indexed component storage.

use crate::Entity;

/// Dense component array indexed by entity slot.
///
/// Snapshots are whole-table copies; `clone_from` reuses the destination
/// allocation.
#[derive(Debug, PartialEq)]
pub struct ComponentTable<T> {
    slots: Vec<Option<T>>,
}

impl<T: Clone> Clone for ComponentTable<T> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.slots.clone_from(&source.slots);
    }
}

impl<T> Default for ComponentTable<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> ComponentTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` for `entity`, growing the table if needed.
    pub fn insert(&mut self, entity: Entity, value: T) {
        let index = entity as usize;
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(value);
    }

    /// Mutable access to the value for `entity`, inserting `default()` first
    /// when the slot is empty.
    pub fn get_or_insert_with(&mut self, entity: Entity, default: impl FnOnce() -> T) -> &mut T {
        let index = entity as usize;
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index].get_or_insert_with(default)
    }

    pub fn remove(&mut self, entity: Entity) -> Option<T> {
        self.slots.get_mut(entity as usize).and_then(Option::take)
    }

    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.slots.get(entity as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.slots.get_mut(entity as usize).and_then(Option::as_mut)
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.get(entity).is_some()
    }

    /// Occupied slots in ascending entity order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, value)| value.as_ref().map(|v| (slot as Entity, v)))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
