//! Kinematic integration and box trigger detection.

use crate::component::ComponentTable;
use crate::entity::{EntityManager, EntityMask};
use crate::math::Vec2;
use crate::Entity;

/// Rigid body state. Rotation is in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Body {
    pub position: Vec2,
    pub velocity: Vec2,
    pub rotation: f32,
    pub angular_velocity: f32,
}

/// Axis-aligned box collider, `extends` being half the box size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxCollider {
    pub extends: Vec2,
}

impl Default for BoxCollider {
    fn default() -> Self {
        Self {
            extends: Vec2::new(0.5, 0.5),
        }
    }
}

impl BoxCollider {
    fn overlaps(self, position: Vec2, other: BoxCollider, other_position: Vec2) -> bool {
        let min = position - self.extends;
        let max = position + self.extends;
        let other_min = other_position - other.extends;
        let other_max = other_position + other.extends;
        min.x < other_max.x && other_min.x < max.x && min.y < other_max.y && other_min.y < max.y
    }
}

/// A pair of entities whose colliders overlap after a step, `first < second`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub first: Entity,
    pub second: Entity,
}

/// Bodies and colliders of one simulation state.
#[derive(Debug, Default, PartialEq)]
pub struct PhysicsManager {
    bodies: ComponentTable<Body>,
    boxes: ComponentTable<BoxCollider>,
}

impl Clone for PhysicsManager {
    fn clone(&self) -> Self {
        Self {
            bodies: self.bodies.clone(),
            boxes: self.boxes.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.bodies.clone_from(&source.bodies);
        self.boxes.clone_from(&source.boxes);
    }
}

impl PhysicsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance every live body by `dt` seconds, then report overlapping
    /// live colliders in ascending `(first, second)` order.
    pub fn fixed_update(&mut self, entities: &EntityManager, dt: f32) -> Vec<Trigger> {
        for entity in entities.entities_with(EntityMask::BODY2D) {
            if !entities.is_live(entity) {
                continue;
            }
            if let Some(body) = self.bodies.get_mut(entity) {
                body.position += body.velocity * dt;
                body.rotation += body.angular_velocity * dt;
            }
        }

        let colliders: Vec<(Entity, Vec2, BoxCollider)> = entities
            .entities_with(EntityMask::BODY2D | EntityMask::BOX_COLLIDER2D)
            .filter(|&entity| entities.is_live(entity))
            .filter_map(|entity| {
                let body = self.bodies.get(entity)?;
                let collider = self.boxes.get(entity)?;
                Some((entity, body.position, *collider))
            })
            .collect();

        let mut triggers = Vec::new();
        for (i, &(first, position, collider)) in colliders.iter().enumerate() {
            for &(second, other_position, other) in &colliders[i + 1..] {
                if collider.overlaps(position, other, other_position) {
                    triggers.push(Trigger { first, second });
                }
            }
        }
        triggers
    }

    pub fn add_body(&mut self, entity: Entity) {
        self.bodies.insert(entity, Body::default());
    }

    pub fn set_body(&mut self, entity: Entity, body: Body) {
        self.bodies.insert(entity, body);
    }

    pub fn body(&self, entity: Entity) -> Option<&Body> {
        self.bodies.get(entity)
    }

    pub fn body_mut(&mut self, entity: Entity) -> Option<&mut Body> {
        self.bodies.get_mut(entity)
    }

    pub fn set_box(&mut self, entity: Entity, collider: BoxCollider) {
        self.boxes.insert(entity, collider);
    }

    pub fn collider(&self, entity: Entity) -> Option<&BoxCollider> {
        self.boxes.get(entity)
    }

    pub fn remove(&mut self, entity: Entity) {
        self.bodies.remove(entity);
        self.boxes.remove(entity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn(entities: &mut EntityManager, physics: &mut PhysicsManager, body: Body) -> Entity {
        let entity = entities.create_entity();
        entities.add_component_type(entity, EntityMask::BODY2D | EntityMask::BOX_COLLIDER2D);
        physics.set_body(entity, body);
        physics.set_box(entity, BoxCollider::default());
        entity
    }

    #[test]
    fn test_integration_moves_and_rotates() {
        let mut entities = EntityManager::new();
        let mut physics = PhysicsManager::new();
        let e = spawn(
            &mut entities,
            &mut physics,
            Body {
                velocity: Vec2::new(1.0, -2.0),
                angular_velocity: 90.0,
                ..Body::default()
            },
        );

        physics.fixed_update(&entities, 0.5);

        let body = physics.body(e).expect("body");
        assert_eq!(body.position, Vec2::new(0.5, -1.0));
        assert_eq!(body.rotation, 45.0);
    }

    #[test]
    fn test_destroyed_body_is_frozen_and_silent() {
        let mut entities = EntityManager::new();
        let mut physics = PhysicsManager::new();
        let a = spawn(&mut entities, &mut physics, Body::default());
        let b = spawn(
            &mut entities,
            &mut physics,
            Body {
                velocity: Vec2::new(1.0, 0.0),
                ..Body::default()
            },
        );
        entities.add_component_type(b, EntityMask::DESTROYED);

        let triggers = physics.fixed_update(&entities, 0.1);

        assert!(triggers.is_empty());
        assert_eq!(physics.body(b).expect("body").position, Vec2::ZERO);
        assert_eq!(physics.body(a).expect("body").position, Vec2::ZERO);
    }

    #[test]
    fn test_triggers_are_ordered_pairs() {
        let mut entities = EntityManager::new();
        let mut physics = PhysicsManager::new();
        let far = Body {
            position: Vec2::new(10.0, 10.0),
            ..Body::default()
        };
        let a = spawn(&mut entities, &mut physics, Body::default());
        let _ = spawn(&mut entities, &mut physics, far);
        let c = spawn(
            &mut entities,
            &mut physics,
            Body {
                position: Vec2::new(0.75, 0.0),
                ..Body::default()
            },
        );
        let d = spawn(
            &mut entities,
            &mut physics,
            Body {
                position: Vec2::new(-0.5, 0.5),
                ..Body::default()
            },
        );

        let triggers = physics.fixed_update(&entities, 0.0);

        assert_eq!(
            triggers,
            vec![
                Trigger { first: a, second: c },
                Trigger { first: a, second: d },
            ]
        );
    }
}
