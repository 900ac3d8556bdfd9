//! Game-level facade over the rollback manager.

use tracing::info;

use crate::input::PlayerInput;
use crate::math::Vec2;
use crate::rollback::RollbackManager;
use crate::transform::TransformManager;
use crate::{Entity, Frame, INVALID_PLAYER, MAX_PLAYER_NMB, PhysicsState, PlayerNumber};

/// Owns one match worth of simulation plus the local frame clock.
///
/// `current_frame` is the frame this peer is producing inputs for. The
/// input window may run ahead of it when remote inputs for later frames
/// arrive.
#[derive(Debug, Clone)]
pub struct GameManager {
    rollback: RollbackManager,
    current_frame: Frame,
    winner: PlayerNumber,
}

impl Default for GameManager {
    fn default() -> Self {
        Self::new()
    }
}

impl GameManager {
    pub fn new() -> Self {
        Self {
            rollback: RollbackManager::new(),
            current_frame: 0,
            winner: INVALID_PLAYER,
        }
    }

    /// Spawn `player` once; later calls return the existing entity.
    pub fn spawn_player(&mut self, player: PlayerNumber, position: Vec2, rotation: f32) -> Entity {
        if let Some(entity) = self.rollback.player_entity(player) {
            return entity;
        }
        let entity = self.rollback.entity_manager_mut().create_entity();
        self.rollback.spawn_player(player, entity, position, rotation);
        info!(player, entity, "spawned player");
        entity
    }

    pub fn set_player_input(&mut self, player: PlayerNumber, input: PlayerInput, frame: Frame) {
        if player == INVALID_PLAYER {
            return;
        }
        self.rollback.set_player_input(player, input, frame);
    }

    /// Move the local clock one frame forward.
    pub fn advance_frame(&mut self) {
        self.current_frame += 1;
        self.rollback.start_new_frame(self.current_frame);
    }

    /// Predict up to the local clock.
    pub fn simulate_to_current_frame(&mut self) {
        self.rollback.simulate_to_frame(self.current_frame);
    }

    /// Validate up to `new_validate_frame`, first growing the input window if
    /// it has not reached that frame yet.
    pub fn validate(&mut self, new_validate_frame: Frame) {
        if self.rollback.current_frame() < new_validate_frame {
            self.rollback.start_new_frame(new_validate_frame);
        }
        self.rollback.validate_frame(new_validate_frame);
    }

    pub fn confirm(
        &mut self,
        new_validate_frame: Frame,
        physics_states: &[PhysicsState; MAX_PLAYER_NMB],
    ) {
        self.rollback.confirm_frame(new_validate_frame, physics_states);
    }

    /// The only player still alive in the validated state, once every
    /// player has spawned. `INVALID_PLAYER` otherwise.
    pub fn check_winner(&self) -> PlayerNumber {
        let mut alive = None;
        let mut alive_count = 0;
        for player in 0..MAX_PLAYER_NMB as PlayerNumber {
            let Some(entity) = self.rollback.player_entity(player) else {
                return INVALID_PLAYER;
            };
            let is_alive = self
                .rollback
                .last_validated_state()
                .players
                .get(entity)
                .is_some_and(|character| character.is_alive());
            if is_alive {
                alive = Some(player);
                alive_count += 1;
            }
        }
        match alive {
            Some(player) if alive_count == 1 => player,
            _ => INVALID_PLAYER,
        }
    }

    pub fn win_game(&mut self, winner: PlayerNumber) {
        info!(winner, frame = self.rollback.last_validate_frame(), "game won");
        self.winner = winner;
    }

    pub fn winner(&self) -> PlayerNumber {
        self.winner
    }

    pub fn current_frame(&self) -> Frame {
        self.current_frame
    }

    pub fn last_validate_frame(&self) -> Frame {
        self.rollback.last_validate_frame()
    }

    pub fn physics_states(&self) -> [PhysicsState; MAX_PLAYER_NMB] {
        std::array::from_fn(|player| self.rollback.validate_physics_state(player as PlayerNumber))
    }

    pub fn player_entity(&self, player: PlayerNumber) -> Option<Entity> {
        self.rollback.player_entity(player)
    }

    pub fn transforms(&self) -> &TransformManager {
        self.rollback.transforms()
    }

    pub fn rollback(&self) -> &RollbackManager {
        &self.rollback
    }
}
