//! Asteroid Simulation Core
//!
//! Deterministic, fixed-timestep rollback simulation for the Asteroid
//! multiplayer game. Every peer (server and clients) runs this same code and
//! must reach bit-identical validated states from identical inputs.
//!
//! # Architecture Constraints
//!
//! The Simulation Core MUST NOT:
//! - Perform I/O operations (file, network, etc.)
//! - Read wall-clock time
//! - Use unseeded randomness
//! - Depend on render frame rate or variable delta time
//!
//! Trigonometry uses `libm` so results do not depend on the platform libm.
//!
//! # Layout
//!
//! - [`input_window`]: per-player input history, "frames back" indexed
//! - [`rollback`]: current / last-validated states and resimulation
//! - [`game`]: match-level facade used by the server and client edges
//! - [`physics`], [`player`], [`bullet`]: the fixed-step systems

#![deny(unsafe_code)]

pub mod bullet;
pub mod component;
pub mod entity;
pub mod game;
pub mod input;
pub mod input_window;
pub mod math;
pub mod physics;
pub mod player;
pub mod rollback;
pub mod state;
pub mod transform;

pub use game::GameManager;
pub use input::PlayerInput;
pub use input_window::InputWindow;
pub use math::Vec2;
pub use rollback::{CreatedEntity, RollbackManager};

// ============================================================================
// Type Aliases
// ============================================================================

/// A single fixed simulation step; frame 0 is the spawn state.
pub type Frame = u32;

/// Zero-based player slot in a match.
pub type PlayerNumber = u8;

/// Per-player 16-bit checksum of the validated body.
pub type PhysicsState = u16;

/// Entity slot index.
pub type Entity = u32;

pub const INVALID_PLAYER: PlayerNumber = PlayerNumber::MAX;
pub const INVALID_ENTITY: Entity = Entity::MAX;

/// Players per match.
pub const MAX_PLAYER_NMB: usize = 2;

// ============================================================================
// Timing
// ============================================================================

pub const TICK_RATE_HZ: u32 = 50;

/// Seconds per frame.
pub const FIXED_PERIOD: f32 = 0.02;

/// Frames of input history kept per player (5 s at 50 Hz).
pub const INPUT_WINDOW_SIZE: usize = 250;

// ============================================================================
// Gameplay Tuning
// ============================================================================

/// Units per second squared along the facing direction.
pub const PLAYER_ACCELERATION: f32 = 1.0;

/// Degrees per second.
pub const PLAYER_ANGULAR_SPEED: f32 = 90.0;

/// Seconds between two shots.
pub const PLAYER_SHOOTING_PERIOD: f32 = 0.3;

pub const PLAYER_HEALTH: u8 = 5;

/// Seconds of invulnerability after a hit.
pub const PLAYER_INVINCIBILITY_PERIOD: f32 = 1.5;

pub const PLAYER_BOX_EXTENDS: Vec2 = Vec2::new(0.5, 0.5);

/// Units per second, added to the shooter's forward speed.
pub const BULLET_SPEED: f32 = 2.0;

/// Bullet lifetime in seconds.
pub const BULLET_PERIOD: f32 = 3.0;

pub const BULLET_SCALE: f32 = 0.2;

pub const BULLET_BOX_EXTENDS: Vec2 = Vec2::new(0.5 * BULLET_SCALE, 0.5 * BULLET_SCALE);

// ============================================================================
// Spawn Layout
// ============================================================================

const SPAWN_DISTANCE: f32 = 3.0;

const SPAWN_DIRECTIONS: [Vec2; 4] = [
    Vec2::new(0.0, 1.0),
    Vec2::new(0.0, -1.0),
    Vec2::new(1.0, 0.0),
    Vec2::new(-1.0, 0.0),
];

const SPAWN_ROTATIONS: [f32; 4] = [0.0, 180.0, -90.0, 90.0];

/// Spawn position of `player`.
///
/// # Panics
/// If `player` has no spawn slot.
pub fn spawn_position(player: PlayerNumber) -> Vec2 {
    SPAWN_DIRECTIONS[usize::from(player)] * SPAWN_DISTANCE
}

/// Spawn rotation of `player` in degrees.
pub fn spawn_rotation(player: PlayerNumber) -> f32 {
    SPAWN_ROTATIONS[usize::from(player)]
}

/// Checksum algorithm identifier, recorded in replays.
pub const PHYSICS_STATE_ALGO_ID: &str = "physicsstate-v1-u16sum-f32bits-posvelrot";

// ============================================================================
// Tests
// ============================================================================
