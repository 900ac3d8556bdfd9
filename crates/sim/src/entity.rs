//! Entity store: one capability mask per entity slot.

use bitflags::bitflags;

use crate::{Entity, INVALID_ENTITY};

bitflags! {
    /// Components attached to an entity slot.
    ///
    /// An empty mask marks a free slot. `DESTROYED` is a soft-delete flag:
    /// the slot keeps its components until the next rollback or validation
    /// removes it for good.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EntityMask: u32 {
        const BODY2D = 1 << 0;
        const BOX_COLLIDER2D = 1 << 1;
        const TRANSFORM = 1 << 2;
        const PLAYER_CHARACTER = 1 << 3;
        const BULLET = 1 << 4;
        const DESTROYED = 1 << 5;
    }
}

/// Slot allocator and component mask registry.
///
/// Allocation always returns the lowest free slot, so two peers that create
/// and destroy the same entities in the same order agree on every handle.
#[derive(Debug, Clone, Default)]
pub struct EntityManager {
    masks: Vec<EntityMask>,
}

impl EntityManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_entity(&mut self) -> Entity {
        if let Some(slot) = self.masks.iter().position(|mask| mask.is_empty()) {
            return slot as Entity;
        }
        self.masks.push(EntityMask::empty());
        (self.masks.len() - 1) as Entity
    }

    /// Physically free a slot. The caller removes component data.
    pub fn destroy_entity(&mut self, entity: Entity) {
        if let Some(mask) = self.masks.get_mut(entity as usize) {
            *mask = EntityMask::empty();
        }
    }

    pub fn entity_exists(&self, entity: Entity) -> bool {
        entity != INVALID_ENTITY
            && self
                .masks
                .get(entity as usize)
                .is_some_and(|mask| !mask.is_empty())
    }

    /// True when the entity exists and is not soft-deleted.
    pub fn is_live(&self, entity: Entity) -> bool {
        self.mask(entity)
            .is_some_and(|mask| !mask.is_empty() && !mask.contains(EntityMask::DESTROYED))
    }

    pub fn has_component(&self, entity: Entity, component: EntityMask) -> bool {
        self.mask(entity).is_some_and(|mask| mask.contains(component))
    }

    /// Mark `component` present on `entity`.
    ///
    /// # Panics
    /// If the entity slot was never allocated.
    pub fn add_component_type(&mut self, entity: Entity, component: EntityMask) {
        let mask = self
            .masks
            .get_mut(entity as usize)
            .unwrap_or_else(|| panic!("entity {entity} was never created"));
        mask.insert(component);
    }

    pub fn remove_component_type(&mut self, entity: Entity, component: EntityMask) {
        if let Some(mask) = self.masks.get_mut(entity as usize) {
            mask.remove(component);
        }
    }

    pub fn mask(&self, entity: Entity) -> Option<EntityMask> {
        self.masks.get(entity as usize).copied()
    }

    /// Number of allocated slots, free or not. Iteration bound for updates.
    pub fn entities_size(&self) -> usize {
        self.masks.len()
    }

    /// Every slot index carrying `component`, ascending.
    pub fn entities_with(&self, component: EntityMask) -> impl Iterator<Item = Entity> + '_ {
        self.masks
            .iter()
            .enumerate()
            .filter(move |(_, mask)| mask.contains(component))
            .map(|(slot, _)| slot as Entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_reuses_lowest_free_slot() {
        let mut entities = EntityManager::new();
        let a = entities.create_entity();
        entities.add_component_type(a, EntityMask::BODY2D);
        let b = entities.create_entity();
        entities.add_component_type(b, EntityMask::BODY2D);
        let c = entities.create_entity();
        entities.add_component_type(c, EntityMask::BODY2D);
        assert_eq!((a, b, c), (0, 1, 2));

        entities.destroy_entity(b);
        assert!(!entities.entity_exists(b));
        assert_eq!(entities.create_entity(), 1);
        assert_eq!(entities.entities_size(), 3);
    }

    #[test]
    fn test_unmarked_slot_is_handed_out_again() {
        let mut entities = EntityManager::new();
        let a = entities.create_entity();
        assert_eq!(entities.create_entity(), a);
    }

    #[test]
    fn test_destroyed_flag_is_not_live() {
        let mut entities = EntityManager::new();
        let e = entities.create_entity();
        entities.add_component_type(e, EntityMask::BULLET);
        assert!(entities.is_live(e));

        entities.add_component_type(e, EntityMask::DESTROYED);
        assert!(entities.entity_exists(e));
        assert!(!entities.is_live(e));

        entities.remove_component_type(e, EntityMask::DESTROYED);
        assert!(entities.is_live(e));
    }

    #[test]
    fn test_entities_with_is_ascending() {
        let mut entities = EntityManager::new();
        for _ in 0..4 {
            let e = entities.create_entity();
            entities.add_component_type(e, EntityMask::TRANSFORM);
        }
        entities.add_component_type(1, EntityMask::BULLET);
        entities.add_component_type(3, EntityMask::BULLET);
        let bullets: Vec<_> = entities.entities_with(EntityMask::BULLET).collect();
        assert_eq!(bullets, vec![1, 3]);
    }
}
