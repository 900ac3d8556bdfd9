//! Asteroid Wire Protocol
//!
//! Shared packet types for communication between game clients and the
//! server. Both sides MUST depend on this crate so that they agree on the
//! exact byte layout.
//!
//! # Packet Categories
//!
//! - **Control** (reliable + ordered): join, spawn, start and win messages,
//!   encoded as Protobuf bodies.
//! - **Realtime** (unreliable): player inputs and validated-frame checksums,
//!   encoded as fixed-width little-endian bodies (see [`packet`]).
//!
//! Every datagram starts with `[protocol_version: u8][packet_type: u8]`.

#![deny(unsafe_code)]

use prost::Message;

pub mod packet;

pub use packet::{
    Delivery, Packet, PacketSender, PacketType, PlayerInputPacket, ValidateFramePacket, WireError,
};

/// Version byte leading every datagram.
pub const PROTOCOL_VERSION: u8 = 1;

/// Frames of input history carried by each input packet.
pub const MAX_INPUT_NMB: usize = 50;

// ============================================================================
// Control Channel Messages
// ============================================================================

/// Client asks to join the match.
#[derive(Clone, PartialEq, Message)]
pub struct JoinPacket {
    /// Random id chosen by the client; identifies it until it knows its
    /// player number.
    #[prost(uint64, tag = "1")]
    pub client_id: u64,

    /// Client wall clock at send time, in milliseconds.
    #[prost(uint64, tag = "2")]
    pub client_time_ms: u64,
}

/// Server acknowledges a join. Broadcast; clients match on `client_id`.
#[derive(Clone, PartialEq, Message)]
pub struct JoinAckPacket {
    #[prost(uint64, tag = "1")]
    pub client_id: u64,

    #[prost(uint32, tag = "2")]
    pub player_number: u32, // Wire as u32 for protobuf compatibility
}

/// Spawn a player ship at a position and rotation (degrees).
#[derive(Clone, PartialEq, Message)]
pub struct SpawnPlayerPacket {
    #[prost(uint64, tag = "1")]
    pub client_id: u64,

    #[prost(uint32, tag = "2")]
    pub player_number: u32,

    #[prost(float, tag = "3")]
    pub x: f32,

    #[prost(float, tag = "4")]
    pub y: f32,

    #[prost(float, tag = "5")]
    pub rotation: f32,
}

/// Match start, in server wall-clock milliseconds.
#[derive(Clone, PartialEq, Message)]
pub struct StartGamePacket {
    #[prost(uint64, tag = "1")]
    pub start_time_ms: u64,
}

/// Match end. `winner` is `INVALID_PLAYER` when nobody won.
#[derive(Clone, PartialEq, Message)]
pub struct WinGamePacket {
    #[prost(uint32, tag = "1")]
    pub winner: u32,
}

// ============================================================================
// Replay Artifact Types
// ============================================================================

/// Player spawn recorded for replay initialization.
#[derive(Clone, PartialEq, Message)]
pub struct SpawnRecord {
    #[prost(uint32, tag = "1")]
    pub player_number: u32,

    #[prost(uint32, tag = "2")]
    pub entity: u32,

    #[prost(float, tag = "3")]
    pub x: f32,

    #[prost(float, tag = "4")]
    pub y: f32,

    #[prost(float, tag = "5")]
    pub rotation: f32,
}

/// Validated inputs of every player for one frame, one byte per player in
/// player-number order.
#[derive(Clone, PartialEq, Message)]
pub struct FrameInputs {
    #[prost(uint32, tag = "1")]
    pub frame: u32,

    #[prost(bytes = "vec", tag = "2")]
    pub inputs: Vec<u8>,
}

/// Checksums broadcast for a validated frame.
#[derive(Clone, PartialEq, Message)]
pub struct Checkpoint {
    #[prost(uint32, tag = "1")]
    pub frame: u32,

    /// One u16 checksum per player, widened for protobuf.
    #[prost(uint32, repeated, tag = "2")]
    pub physics_states: Vec<u32>,
}

/// Tuning parameter key-value pair.
#[derive(Clone, PartialEq, Message)]
pub struct TuningParameter {
    #[prost(string, tag = "1")]
    pub key: String,

    #[prost(double, tag = "2")]
    pub value: f64,
}

/// Build fingerprint for replay scope verification.
#[derive(Clone, PartialEq, Message)]
pub struct BuildFingerprint {
    /// SHA-256 of server executable bytes.
    #[prost(string, tag = "1")]
    pub binary_sha256: String,

    /// Target triple (e.g., "x86_64-unknown-linux-gnu").
    #[prost(string, tag = "2")]
    pub target_triple: String,

    /// Build profile ("release" or "dev").
    #[prost(string, tag = "3")]
    pub profile: String,

    /// Git commit hash (metadata/traceability).
    #[prost(string, tag = "4")]
    pub git_commit: String,
}

/// Complete replay of one match as seen by the server.
#[derive(Clone, PartialEq, Message)]
pub struct ReplayArtifact {
    /// Schema version, starting at 1.
    #[prost(uint32, tag = "1")]
    pub replay_format_version: u32,

    #[prost(uint32, tag = "2")]
    pub tick_rate_hz: u32,

    #[prost(string, tag = "3")]
    pub physics_state_algo_id: String,

    /// Player spawns in the order they happened.
    #[prost(message, repeated, tag = "4")]
    pub spawns: Vec<SpawnRecord>,

    /// Tuning parameters (sorted by key).
    #[prost(message, repeated, tag = "5")]
    pub tuning_parameters: Vec<TuningParameter>,

    /// Validated inputs, one entry per frame starting at frame 1.
    #[prost(message, repeated, tag = "6")]
    pub inputs: Vec<FrameInputs>,

    /// Checksums at every validation, ascending frame order.
    #[prost(message, repeated, tag = "7")]
    pub checkpoints: Vec<Checkpoint>,

    #[prost(message, optional, tag = "8")]
    pub build_fingerprint: Option<BuildFingerprint>,

    /// Last validated frame.
    #[prost(uint32, tag = "9")]
    pub final_frame: u32,

    /// Match termination reason.
    #[prost(string, tag = "10")]
    pub end_reason: String,

    #[prost(uint32, tag = "11")]
    pub winner: u32,
}

// ============================================================================
// Tests
// ============================================================================
