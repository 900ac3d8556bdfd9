//! Render-facing transforms, decoupled from the simulation snapshots.

use crate::component::ComponentTable;
use crate::math::Vec2;
use crate::Entity;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec2,
    pub scale: Vec2,
    pub rotation: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            scale: Vec2::ONE,
            rotation: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransformManager {
    transforms: ComponentTable<Transform>,
}

impl TransformManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_transform(&mut self, entity: Entity) {
        self.transforms.insert(entity, Transform::default());
    }

    pub fn set_position(&mut self, entity: Entity, position: Vec2) {
        self.entry(entity).position = position;
    }

    pub fn set_scale(&mut self, entity: Entity, scale: Vec2) {
        self.entry(entity).scale = scale;
    }

    pub fn set_rotation(&mut self, entity: Entity, rotation: f32) {
        self.entry(entity).rotation = rotation;
    }

    pub fn position(&self, entity: Entity) -> Option<Vec2> {
        self.transforms.get(entity).map(|t| t.position)
    }

    pub fn scale(&self, entity: Entity) -> Option<Vec2> {
        self.transforms.get(entity).map(|t| t.scale)
    }

    pub fn rotation(&self, entity: Entity) -> Option<f32> {
        self.transforms.get(entity).map(|t| t.rotation)
    }

    pub fn get(&self, entity: Entity) -> Option<&Transform> {
        self.transforms.get(entity)
    }

    pub fn remove(&mut self, entity: Entity) {
        self.transforms.remove(entity);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &Transform)> {
        self.transforms.iter()
    }

    fn entry(&mut self, entity: Entity) -> &mut Transform {
        self.transforms.get_or_insert_with(entity, Transform::default)
    }
}
