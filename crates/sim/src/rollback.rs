//! Speculative and validated simulation states, and the resimulation that
//! moves between them.
//!
//! Both the prediction path ([`RollbackManager::simulate_to_frame`])
//! and the validation path ([`RollbackManager::validate_frame`]) start from
//! the validated snapshot and replay buffered inputs frame by frame through
//! the same fixed step. Entities spawned during a replayed frame are recorded
//! so the next replay can undo them before running again.

use tracing::{debug, error};

use crate::bullet::Bullet;
use crate::entity::{EntityManager, EntityMask};
use crate::input::PlayerInput;
use crate::input_window::InputWindow;
use crate::math::Vec2;
use crate::physics::{Body, BoxCollider, Trigger};
use crate::player::PlayerCharacter;
use crate::state::SimState;
use crate::transform::TransformManager;
use crate::{
    BULLET_BOX_EXTENDS, BULLET_SCALE, Entity, FIXED_PERIOD, Frame, INVALID_ENTITY,
    MAX_PLAYER_NMB, PLAYER_BOX_EXTENDS, PLAYER_INVINCIBILITY_PERIOD, PhysicsState, PlayerNumber,
};

/// An entity spawned speculatively at `created_frame`.
///
/// While `created_frame > last_validate_frame` the entity exists only in the
/// current state and is torn down before every resimulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedEntity {
    pub entity: Entity,
    pub created_frame: Frame,
}

#[derive(Debug, Clone)]
pub struct RollbackManager {
    entities: EntityManager,
    current: SimState,
    last_validated: SimState,
    transforms: TransformManager,
    input_window: InputWindow,
    last_validate_frame: Frame,
    created_entities: Vec<CreatedEntity>,
    player_entities: [Entity; MAX_PLAYER_NMB],
    /// Frame being replayed, stamped onto spawned entities.
    simulated_frame: Frame,
}

impl Default for RollbackManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RollbackManager {
    pub fn new() -> Self {
        Self {
            entities: EntityManager::new(),
            current: SimState::new(),
            last_validated: SimState::new(),
            transforms: TransformManager::new(),
            input_window: InputWindow::new(),
            last_validate_frame: 0,
            created_entities: Vec::new(),
            player_entities: [INVALID_ENTITY; MAX_PLAYER_NMB],
            simulated_frame: 0,
        }
    }

    // ------------------------------------------------------------------------
    // Input window
    // ------------------------------------------------------------------------

    pub fn set_player_input(&mut self, player: PlayerNumber, input: PlayerInput, frame: Frame) {
        self.input_window.set_player_input(player, input, frame);
    }

    pub fn start_new_frame(&mut self, new_frame: Frame) {
        self.input_window.start_new_frame(new_frame);
    }

    pub fn input_at_frame(&self, player: PlayerNumber, frame: Frame) -> PlayerInput {
        self.input_window.input_at_frame(player, frame)
    }

    pub fn last_received_frame(&self, player: PlayerNumber) -> Frame {
        self.input_window.last_received_frame(player)
    }

    pub fn input_window(&self) -> &InputWindow {
        &self.input_window
    }

    /// Newest frame known to the input window.
    pub fn current_frame(&self) -> Frame {
        self.input_window.current_frame()
    }

    pub fn last_validate_frame(&self) -> Frame {
        self.last_validate_frame
    }

    // ------------------------------------------------------------------------
    // Resimulation
    // ------------------------------------------------------------------------

    /// Rebuild the current state by replaying every frame after the last
    /// validated one up to `target`.
    ///
    /// `target` is the caller's local frame. Remote inputs can push the
    /// window further ahead, and those frames are not predicted. It is
    /// clamped between the last validated frame and the window's newest frame.
    pub fn simulate_to_frame(&mut self, target: Frame) {
        let target = target
            .max(self.last_validate_frame)
            .min(self.input_window.current_frame());
        self.restore_last_validated();
        self.resimulate_to(target);
        self.update_transforms();
    }

    /// Commit the state at `new_validate_frame` as the new validated state.
    ///
    /// # Panics
    /// If any player's inputs are not known up to `new_validate_frame`, or if
    /// `new_validate_frame` is older than the last validated frame.
    pub fn validate_frame(&mut self, new_validate_frame: Frame) {
        assert!(
            new_validate_frame >= self.last_validate_frame,
            "validate frame {new_validate_frame} is older than last validated frame {}",
            self.last_validate_frame
        );
        for player in 0..MAX_PLAYER_NMB as PlayerNumber {
            let last_received = self.input_window.last_received_frame(player);
            assert!(
                last_received >= new_validate_frame,
                "cannot validate frame {new_validate_frame}: player {player} inputs only known up to {last_received}"
            );
        }

        self.restore_last_validated();
        self.resimulate_to(new_validate_frame);

        let destroyed: Vec<Entity> = self.entities.entities_with(EntityMask::DESTROYED).collect();
        for entity in destroyed {
            self.remove_entity(entity);
        }

        self.last_validated.clone_from(&self.current);
        self.last_validate_frame = new_validate_frame;
        self.created_entities
            .retain(|created| created.created_frame > new_validate_frame);
        self.update_transforms();

        debug!(frame = new_validate_frame, "frame validated");
    }

    /// Validate `new_validate_frame` and compare every player's checksum with
    /// the authoritative values.
    ///
    /// # Panics
    /// On any checksum mismatch; the simulation has diverged.
    pub fn confirm_frame(
        &mut self,
        new_validate_frame: Frame,
        server_physics_states: &[PhysicsState; MAX_PLAYER_NMB],
    ) {
        self.validate_frame(new_validate_frame);
        for (player, &expected) in server_physics_states.iter().enumerate() {
            let player = player as PlayerNumber;
            let local = self.validate_physics_state(player);
            if local != expected {
                error!(
                    player,
                    frame = new_validate_frame,
                    local,
                    expected,
                    "physics state mismatch after validation"
                );
            }
            assert_eq!(
                local, expected,
                "desync at frame {new_validate_frame} for player {player}"
            );
        }
    }

    /// 16-bit checksum of the validated body of `player`, 0 if not spawned.
    pub fn validate_physics_state(&self, player: PlayerNumber) -> PhysicsState {
        self.player_entity(player)
            .and_then(|entity| self.last_validated.physics.body(entity))
            .map(physics_state_of)
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------------
    // Spawning and destruction
    // ------------------------------------------------------------------------

    /// Spawn `player` on `entity` in both states at once.
    pub fn spawn_player(
        &mut self,
        player: PlayerNumber,
        entity: Entity,
        position: Vec2,
        rotation: f32,
    ) {
        assert!(
            usize::from(player) < MAX_PLAYER_NMB,
            "player number {player} out of range"
        );
        let body = Body {
            position,
            rotation,
            ..Body::default()
        };
        let collider = BoxCollider {
            extends: PLAYER_BOX_EXTENDS,
        };

        self.entities.add_component_type(
            entity,
            EntityMask::BODY2D
                | EntityMask::BOX_COLLIDER2D
                | EntityMask::TRANSFORM
                | EntityMask::PLAYER_CHARACTER,
        );
        for state in [&mut self.current, &mut self.last_validated] {
            state.physics.set_body(entity, body);
            state.physics.set_box(entity, collider);
            state.players.insert(entity, PlayerCharacter::new(player));
        }
        self.transforms.set_position(entity, position);
        self.transforms.set_rotation(entity, rotation);
        self.player_entities[usize::from(player)] = entity;

        debug!(player, entity, "player spawned");
    }

    /// Spawn a bullet on `entity` in the current state only, recorded as
    /// created at the frame being simulated.
    pub fn spawn_bullet(
        &mut self,
        player: PlayerNumber,
        entity: Entity,
        position: Vec2,
        velocity: Vec2,
    ) {
        self.created_entities.push(CreatedEntity {
            entity,
            created_frame: self.simulated_frame,
        });
        self.entities.add_component_type(
            entity,
            EntityMask::BODY2D
                | EntityMask::BOX_COLLIDER2D
                | EntityMask::TRANSFORM
                | EntityMask::BULLET,
        );
        self.current.physics.set_body(
            entity,
            Body {
                position,
                velocity,
                ..Body::default()
            },
        );
        self.current.physics.set_box(
            entity,
            BoxCollider {
                extends: BULLET_BOX_EXTENDS,
            },
        );
        self.current.bullets.insert(entity, Bullet::new(player));
        self.transforms.set_position(entity, position);
        self.transforms.set_scale(entity, Vec2::ONE * BULLET_SCALE);
    }

    /// Soft-delete `entity`; it is physically removed once the frame that
    /// destroyed it is validated.
    pub fn destroy_entity(&mut self, entity: Entity) {
        self.entities.add_component_type(entity, EntityMask::DESTROYED);
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn player_entity(&self, player: PlayerNumber) -> Option<Entity> {
        self.player_entities
            .get(usize::from(player))
            .copied()
            .filter(|&entity| entity != INVALID_ENTITY)
    }

    pub fn entity_manager(&self) -> &EntityManager {
        &self.entities
    }

    pub(crate) fn entity_manager_mut(&mut self) -> &mut EntityManager {
        &mut self.entities
    }

    pub fn current_state(&self) -> &SimState {
        &self.current
    }

    pub fn last_validated_state(&self) -> &SimState {
        &self.last_validated
    }

    pub fn transforms(&self) -> &TransformManager {
        &self.transforms
    }

    pub fn created_entities(&self) -> &[CreatedEntity] {
        &self.created_entities
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Undo everything simulated after the last validated frame.
    fn restore_last_validated(&mut self) {
        let last_validate_frame = self.last_validate_frame;
        let speculative: Vec<Entity> = self
            .created_entities
            .iter()
            .filter(|created| created.created_frame > last_validate_frame)
            .map(|created| created.entity)
            .collect();
        self.created_entities
            .retain(|created| created.created_frame <= last_validate_frame);
        for entity in speculative {
            self.remove_entity(entity);
        }

        let destroyed: Vec<Entity> = self.entities.entities_with(EntityMask::DESTROYED).collect();
        for entity in destroyed {
            self.entities.remove_component_type(entity, EntityMask::DESTROYED);
        }

        self.current.clone_from(&self.last_validated);
    }

    /// Replay frames `last_validate_frame + 1 ..= target` on the current state.
    fn resimulate_to(&mut self, target: Frame) {
        for frame in self.last_validate_frame + 1..=target {
            self.simulated_frame = frame;
            self.assign_inputs(frame);
            self.fixed_update();
        }
    }

    fn assign_inputs(&mut self, frame: Frame) {
        for player in 0..MAX_PLAYER_NMB as PlayerNumber {
            let Some(entity) = self.player_entity(player) else {
                continue;
            };
            let input = self.input_window.input_at_frame(player, frame);
            if let Some(character) = self.current.players.get_mut(entity) {
                character.input = input;
            }
        }
    }

    /// One fixed step: bullets, then players, then physics and triggers.
    fn fixed_update(&mut self) {
        let expired = self.current.bullets.fixed_update(&self.entities, FIXED_PERIOD);
        for entity in expired {
            self.destroy_entity(entity);
        }

        let spawns = self.current.players.fixed_update(
            &self.entities,
            &mut self.current.physics,
            FIXED_PERIOD,
        );
        for spawn in spawns {
            let entity = self.entities.create_entity();
            self.spawn_bullet(spawn.player_number, entity, spawn.position, spawn.velocity);
        }

        let triggers = self
            .current
            .physics
            .fixed_update(&self.entities, FIXED_PERIOD);
        for trigger in triggers {
            self.on_trigger(trigger);
        }
    }

    fn on_trigger(&mut self, trigger: Trigger) {
        let Trigger { first, second } = trigger;
        let (player_entity, bullet_entity) = if self.is_player(first) && self.is_bullet(second) {
            (first, second)
        } else if self.is_player(second) && self.is_bullet(first) {
            (second, first)
        } else {
            return;
        };
        if !self.entities.is_live(bullet_entity) {
            return;
        }
        let Some(bullet) = self.current.bullets.get(bullet_entity).copied() else {
            return;
        };
        let Some(character) = self.current.players.get_mut(player_entity) else {
            return;
        };
        if bullet.player_number == character.player_number {
            return;
        }
        if character.invincibility_time <= 0.0 {
            character.health = character.health.saturating_sub(1);
            character.invincibility_time = PLAYER_INVINCIBILITY_PERIOD;
        }
        self.destroy_entity(bullet_entity);
    }

    fn is_player(&self, entity: Entity) -> bool {
        self.entities.has_component(entity, EntityMask::PLAYER_CHARACTER)
    }

    fn is_bullet(&self, entity: Entity) -> bool {
        self.entities.has_component(entity, EntityMask::BULLET)
    }

    /// Physically free `entity` and its current-state components.
    fn remove_entity(&mut self, entity: Entity) {
        self.current.remove_entity(entity);
        self.transforms.remove(entity);
        self.entities.destroy_entity(entity);
    }

    fn update_transforms(&mut self) {
        let entities = &self.entities;
        let physics = &self.current.physics;
        for entity in entities.entities_with(EntityMask::TRANSFORM) {
            if let Some(body) = physics.body(entity) {
                self.transforms.set_position(entity, body.position);
                self.transforms.set_rotation(entity, body.rotation);
            }
        }
    }
}

/// Wrapping sum of the 16-bit halves of every body field's bit pattern.
fn physics_state_of(body: &Body) -> PhysicsState {
    [
        body.position.x,
        body.position.y,
        body.velocity.x,
        body.velocity.y,
        body.rotation,
        body.angular_velocity,
    ]
    .into_iter()
    .map(f32::to_bits)
    .fold(0u16, |state, bits| {
        state
            .wrapping_add(bits as PhysicsState)
            .wrapping_add((bits >> 16) as PhysicsState)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{INPUT_WINDOW_SIZE, spawn_position, spawn_rotation};

    fn spawned() -> RollbackManager {
        let mut rollback = RollbackManager::new();
        for player in 0..MAX_PLAYER_NMB as PlayerNumber {
            let entity = rollback.entity_manager_mut().create_entity();
            rollback.spawn_player(player, entity, spawn_position(player), spawn_rotation(player));
        }
        rollback
    }

    fn scripted_input(player: PlayerNumber, frame: Frame) -> PlayerInput {
        match (frame + u32::from(player) * 7) % 5 {
            0 => PlayerInput::UP,
            1 => PlayerInput::UP | PlayerInput::LEFT,
            2 => PlayerInput::RIGHT | PlayerInput::SHOOT,
            3 => PlayerInput::DOWN,
            _ => PlayerInput::empty(),
        }
    }

    fn feed(rollback: &mut RollbackManager, frames: std::ops::RangeInclusive<Frame>) {
        for frame in frames {
            for player in 0..MAX_PLAYER_NMB as PlayerNumber {
                rollback.set_player_input(player, scripted_input(player, frame), frame);
            }
        }
    }

    fn checksums(rollback: &RollbackManager) -> [PhysicsState; MAX_PLAYER_NMB] {
        std::array::from_fn(|p| rollback.validate_physics_state(p as PlayerNumber))
    }

    #[test]
    fn test_physics_state_sums_half_words() {
        let body = Body {
            position: Vec2::new(1.0, 0.0),
            ..Body::default()
        };
        // 1.0f32 = 0x3f80_0000
        assert_eq!(physics_state_of(&body), 0x3f80);

        let body = Body {
            position: Vec2::new(f32::from_bits(0xffff_ffff), f32::from_bits(0x0000_0002)),
            ..Body::default()
        };
        assert_eq!(physics_state_of(&body), 0xffffu16.wrapping_mul(2).wrapping_add(2));
    }

    #[test]
    fn test_unspawned_player_checksum_is_zero() {
        let rollback = RollbackManager::new();
        assert_eq!(rollback.validate_physics_state(0), 0);
    }

    #[test]
    fn test_spawn_player_writes_both_states() {
        let rollback = spawned();
        let entity = rollback.player_entity(1).expect("player 1");
        assert_eq!(
            rollback.current_state().physics.body(entity),
            rollback.last_validated_state().physics.body(entity)
        );
        assert_eq!(
            rollback.transforms().position(entity),
            Some(spawn_position(1))
        );
    }

    #[test]
    fn test_validation_is_deterministic_across_instances() {
        let mut server = spawned();
        let mut client = spawned();
        feed(&mut server, 0..=10);
        feed(&mut client, 0..=10);
        client.simulate_to_frame(client.current_frame());

        server.validate_frame(10);
        client.confirm_frame(10, &checksums(&server));

        assert_eq!(checksums(&server), checksums(&client));
        assert_eq!(server.last_validated_state(), client.last_validated_state());
    }

    #[test]
    fn test_validate_twice_is_idempotent() {
        let mut rollback = spawned();
        feed(&mut rollback, 0..=40);
        rollback.validate_frame(30);
        let state = rollback.last_validated_state().clone();
        let sums = checksums(&rollback);

        rollback.validate_frame(30);

        assert_eq!(rollback.last_validated_state(), &state);
        assert_eq!(checksums(&rollback), sums);
        assert_eq!(rollback.last_validate_frame(), 30);
    }

    #[test]
    fn test_incremental_and_single_validation_agree() {
        let mut stepwise = spawned();
        let mut once = spawned();
        feed(&mut stepwise, 0..=60);
        feed(&mut once, 0..=60);

        for frame in (5..=60).step_by(5) {
            stepwise.validate_frame(frame);
            stepwise.simulate_to_frame(stepwise.current_frame());
        }
        once.validate_frame(60);

        assert_eq!(checksums(&stepwise), checksums(&once));
    }

    #[test]
    fn test_speculative_bullet_rolls_back_and_replays() {
        let mut rollback = spawned();
        let shooter = 0;
        let shot_frame = 22;
        for frame in 0..=25 {
            let input = if frame >= shot_frame {
                PlayerInput::SHOOT
            } else {
                PlayerInput::empty()
            };
            rollback.set_player_input(shooter, input, frame);
            rollback.set_player_input(1, PlayerInput::empty(), frame);
        }
        rollback.validate_frame(20);
        rollback.simulate_to_frame(rollback.current_frame());

        let created = rollback.created_entities().to_vec();
        assert_eq!(created.len(), 1);
        let bullet = created[0];
        assert_eq!(bullet.created_frame, shot_frame);
        let predicted = *rollback
            .current_state()
            .physics
            .body(bullet.entity)
            .expect("bullet in current state");
        assert!(rollback.last_validated_state().physics.body(bullet.entity).is_none());

        // Re-validating the same frame rolls the bullet back out.
        rollback.validate_frame(20);
        assert!(rollback.current_state().physics.body(bullet.entity).is_none());
        assert!(!rollback.entity_manager().entity_exists(bullet.entity));
        assert!(rollback.created_entities().is_empty());

        rollback.simulate_to_frame(rollback.current_frame());
        assert_eq!(rollback.created_entities(), &created[..]);
        assert_eq!(
            rollback.current_state().physics.body(bullet.entity),
            Some(&predicted)
        );
    }

    #[test]
    fn test_validated_bullet_becomes_permanent() {
        let mut rollback = spawned();
        for frame in 0..=30 {
            rollback.set_player_input(0, PlayerInput::SHOOT, frame);
            rollback.set_player_input(1, PlayerInput::empty(), frame);
        }
        rollback.simulate_to_frame(rollback.current_frame());
        let bullet = rollback.created_entities()[0];

        rollback.validate_frame(30);

        assert!(rollback.created_entities().is_empty());
        assert!(
            rollback
                .last_validated_state()
                .bullets
                .get(bullet.entity)
                .is_some()
        );
    }

    #[test]
    fn test_bullet_hit_costs_health_once() {
        let mut rollback = RollbackManager::new();
        let target = rollback.entity_manager_mut().create_entity();
        rollback.spawn_player(1, target, Vec2::ZERO, 0.0);
        let other = rollback.entity_manager_mut().create_entity();
        rollback.spawn_player(0, other, Vec2::new(10.0, 0.0), 0.0);

        let first = rollback.entity_manager_mut().create_entity();
        rollback.spawn_bullet(0, first, Vec2::ZERO, Vec2::ZERO);
        let second = rollback.entity_manager_mut().create_entity();
        rollback.spawn_bullet(0, second, Vec2::ZERO, Vec2::ZERO);

        rollback.fixed_update();

        let character = rollback.current_state().players.get(target).expect("target");
        assert_eq!(character.health, crate::PLAYER_HEALTH - 1);
        assert!(character.invincibility_time > 0.0);
        assert!(!rollback.entity_manager().is_live(first));
        assert!(!rollback.entity_manager().is_live(second));
    }

    #[test]
    fn test_own_bullet_is_harmless() {
        let mut rollback = RollbackManager::new();
        let player = rollback.entity_manager_mut().create_entity();
        rollback.spawn_player(0, player, Vec2::ZERO, 0.0);
        let bullet = rollback.entity_manager_mut().create_entity();
        rollback.spawn_bullet(0, bullet, Vec2::ZERO, Vec2::ZERO);

        rollback.fixed_update();

        let character = rollback.current_state().players.get(player).expect("player");
        assert_eq!(character.health, crate::PLAYER_HEALTH);
        assert!(rollback.entity_manager().is_live(bullet));
    }

    #[test]
    #[should_panic(expected = "cannot validate frame")]
    fn test_validate_ahead_of_inputs_panics() {
        let mut rollback = spawned();
        feed(&mut rollback, 0..=5);
        rollback.set_player_input(0, PlayerInput::UP, 9);
        rollback.validate_frame(9);
    }

    #[test]
    #[should_panic(expected = "desync")]
    fn test_confirm_with_wrong_checksum_panics() {
        let mut reference = spawned();
        feed(&mut reference, 0..=5);
        reference.validate_frame(5);
        let mut wrong = checksums(&reference);
        wrong[0] = wrong[0].wrapping_add(1);

        let mut rollback = spawned();
        feed(&mut rollback, 0..=5);
        rollback.confirm_frame(5, &wrong);
    }

    #[test]
    fn test_prediction_stops_at_target_frame() {
        let mut ahead = spawned();
        feed(&mut ahead, 0..=40);
        ahead.simulate_to_frame(5);

        let mut local = spawned();
        feed(&mut local, 0..=5);
        local.simulate_to_frame(5);

        assert_eq!(ahead.current_frame(), 40);
        assert_eq!(ahead.current_state(), local.current_state());
    }

    #[test]
    fn test_prediction_target_clamped_to_validated_frame() {
        let mut rollback = spawned();
        feed(&mut rollback, 0..=10);
        rollback.validate_frame(10);
        rollback.simulate_to_frame(3);
        assert_eq!(rollback.current_state(), rollback.last_validated_state());
    }

    #[test]
    fn test_resimulation_within_window() {
        let mut rollback = spawned();
        let last = INPUT_WINDOW_SIZE as Frame - 1;
        feed(&mut rollback, 0..=last);
        rollback.simulate_to_frame(rollback.current_frame());
        rollback.validate_frame(last);
        assert_eq!(rollback.last_validate_frame(), last);
        assert!(rollback.current_frame() >= rollback.last_validate_frame());
    }
}
