//! The snapshot unit shared by the speculative and validated copies.

use crate::bullet::BulletManager;
use crate::physics::PhysicsManager;
use crate::player::PlayerCharacterManager;
use crate::Entity;

/// All component data that resimulation rewrites.
///
/// Restore is `current.clone_from(&last_validated)` and commit is the
/// reverse; no per-field copying.
#[derive(Debug, Default, PartialEq)]
pub struct SimState {
    pub physics: PhysicsManager,
    pub players: PlayerCharacterManager,
    pub bullets: BulletManager,
}

impl Clone for SimState {
    fn clone(&self) -> Self {
        Self {
            physics: self.physics.clone(),
            players: self.players.clone(),
            bullets: self.bullets.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.physics.clone_from(&source.physics);
        self.players.clone_from(&source.players);
        self.bullets.clone_from(&source.bullets);
    }
}

impl SimState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every component held for `entity`.
    pub fn remove_entity(&mut self, entity: Entity) {
        self.physics.remove(entity);
        self.players.remove(entity);
        self.bullets.remove(entity);
    }
}
