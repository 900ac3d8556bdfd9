//! Bullet lifetime tracking.

use crate::component::ComponentTable;
use crate::entity::{EntityManager, EntityMask};
use crate::{BULLET_PERIOD, Entity, PlayerNumber};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bullet {
    pub remaining_time: f32,
    pub player_number: PlayerNumber,
}

impl Bullet {
    pub fn new(player_number: PlayerNumber) -> Self {
        Self {
            remaining_time: BULLET_PERIOD,
            player_number,
        }
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct BulletManager {
    bullets: ComponentTable<Bullet>,
}

impl Clone for BulletManager {
    fn clone(&self) -> Self {
        Self {
            bullets: self.bullets.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.bullets.clone_from(&source.bullets);
    }
}

impl BulletManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Age every live bullet by `dt`; returns those whose lifetime ran out.
    pub fn fixed_update(&mut self, entities: &EntityManager, dt: f32) -> Vec<Entity> {
        let mut expired = Vec::new();
        for entity in entities.entities_with(EntityMask::BULLET) {
            if !entities.is_live(entity) {
                continue;
            }
            if let Some(bullet) = self.bullets.get_mut(entity) {
                bullet.remaining_time -= dt;
                if bullet.remaining_time < 0.0 {
                    expired.push(entity);
                }
            }
        }
        expired
    }

    pub fn insert(&mut self, entity: Entity, bullet: Bullet) {
        self.bullets.insert(entity, bullet);
    }

    pub fn get(&self, entity: Entity) -> Option<&Bullet> {
        self.bullets.get(entity)
    }

    pub fn remove(&mut self, entity: Entity) {
        self.bullets.remove(entity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FIXED_PERIOD;

    #[test]
    fn test_bullet_expires_after_its_period() {
        let mut entities = EntityManager::new();
        let mut bullets = BulletManager::new();
        let e = entities.create_entity();
        entities.add_component_type(e, EntityMask::BULLET);
        bullets.insert(e, Bullet::new(1));

        let mut steps = 0;
        loop {
            steps += 1;
            if !bullets.fixed_update(&entities, FIXED_PERIOD).is_empty() {
                break;
            }
            assert!(steps < 1000, "bullet never expired");
        }
        // 3 s at 50 Hz, give or take float accumulation.
        assert!((150..=152).contains(&steps), "expired after {steps} steps");
    }

    #[test]
    fn test_destroyed_bullet_does_not_age() {
        let mut entities = EntityManager::new();
        let mut bullets = BulletManager::new();
        let e = entities.create_entity();
        entities.add_component_type(e, EntityMask::BULLET | EntityMask::DESTROYED);
        bullets.insert(e, Bullet::new(0));

        bullets.fixed_update(&entities, 1.0);

        assert_eq!(bullets.get(e).expect("bullet").remaining_time, BULLET_PERIOD);
    }
}
