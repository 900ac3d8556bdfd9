//! Asteroid Replay System
//!
//! This crate records what the server validated during a match and checks
//! that replaying it reproduces the same checksums.
//!
//! # Architecture
//!
//! - [`ReplayRecorder`]: collects spawns, validated inputs and the checksums
//!   broadcast at each validation
//! - [`verify_replay`]: resimulates a [`ReplayArtifact`] through a fresh
//!   [`GameManager`], validating at the recorded frames
//! - Build fingerprint acquisition for same-build verification scope

#![deny(unsafe_code)]

use std::collections::HashSet;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use asteroid_sim::{
    BULLET_PERIOD, BULLET_SPEED, Entity, Frame, GameManager, INPUT_WINDOW_SIZE, INVALID_PLAYER,
    MAX_PLAYER_NMB, PHYSICS_STATE_ALGO_ID, PLAYER_ACCELERATION, PLAYER_ANGULAR_SPEED,
    PLAYER_HEALTH, PLAYER_INVINCIBILITY_PERIOD, PLAYER_SHOOTING_PERIOD, PhysicsState,
    PlayerInput, PlayerNumber, TICK_RATE_HZ, Vec2,
};
use asteroid_wire::{
    BuildFingerprint, Checkpoint, FrameInputs, ReplayArtifact, SpawnRecord, TuningParameter,
};
use prost::Message;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

/// Current replay schema version.
pub const REPLAY_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Replay Recorder
// ============================================================================

/// Records match data for replay artifact generation.
#[derive(Debug, Clone, Default)]
pub struct ReplayRecorder {
    spawns: Vec<SpawnRecord>,
    inputs: Vec<FrameInputs>,
    checkpoints: Vec<Checkpoint>,
    build_fingerprint: Option<BuildFingerprintData>,
}

/// Build fingerprint data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFingerprintData {
    pub binary_sha256: String,
    pub target_triple: String,
    pub profile: String,
    pub git_commit: String,
}

impl ReplayRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_spawn(
        &mut self,
        player: PlayerNumber,
        entity: Entity,
        position: Vec2,
        rotation: f32,
    ) {
        self.spawns.push(SpawnRecord {
            player_number: u32::from(player),
            entity,
            x: position.x,
            y: position.y,
            rotation,
        });
    }

    /// Record the validated inputs of every player for `frame`.
    ///
    /// Frames must be recorded in order, starting at frame 1.
    pub fn record_frame_inputs(&mut self, frame: Frame, inputs: [PlayerInput; MAX_PLAYER_NMB]) {
        debug_assert_eq!(
            frame,
            self.recorded_frame() + 1,
            "frame inputs must be recorded contiguously"
        );
        self.inputs.push(FrameInputs {
            frame,
            inputs: inputs.iter().map(|input| input.bits()).collect(),
        });
    }

    /// Record the checksums broadcast for a validated frame.
    pub fn record_checkpoint(
        &mut self,
        frame: Frame,
        physics_states: &[PhysicsState; MAX_PLAYER_NMB],
    ) {
        self.checkpoints.push(Checkpoint {
            frame,
            physics_states: physics_states.iter().map(|&s| u32::from(s)).collect(),
        });
    }

    /// Last frame whose inputs were recorded, 0 before any.
    pub fn recorded_frame(&self) -> Frame {
        self.inputs.last().map_or(0, |inputs| inputs.frame)
    }

    pub fn set_build_fingerprint(&mut self, fingerprint: BuildFingerprintData) {
        self.build_fingerprint = Some(fingerprint);
    }

    /// Finalize the replay artifact.
    pub fn finalize(self, winner: PlayerNumber, end_reason: &str) -> ReplayArtifact {
        let final_frame = self.checkpoints.last().map_or(0, |checkpoint| checkpoint.frame);

        let build_fingerprint = self.build_fingerprint.map(|f| BuildFingerprint {
            binary_sha256: f.binary_sha256,
            target_triple: f.target_triple,
            profile: f.profile,
            git_commit: f.git_commit,
        });

        ReplayArtifact {
            replay_format_version: REPLAY_FORMAT_VERSION,
            tick_rate_hz: TICK_RATE_HZ,
            physics_state_algo_id: PHYSICS_STATE_ALGO_ID.to_string(),
            spawns: self.spawns,
            tuning_parameters: tuning_parameters(),
            inputs: self.inputs,
            checkpoints: self.checkpoints,
            build_fingerprint,
            final_frame,
            end_reason: end_reason.to_string(),
            winner: u32::from(winner),
        }
    }
}

/// Gameplay constants the recorded checksums depend on, sorted by key.
fn tuning_parameters() -> Vec<TuningParameter> {
    let mut parameters: Vec<TuningParameter> = [
        ("bullet_period", BULLET_PERIOD),
        ("bullet_speed", BULLET_SPEED),
        ("player_acceleration", PLAYER_ACCELERATION),
        ("player_angular_speed", PLAYER_ANGULAR_SPEED),
        ("player_health", f32::from(PLAYER_HEALTH)),
        ("player_invincibility_period", PLAYER_INVINCIBILITY_PERIOD),
        ("player_shooting_period", PLAYER_SHOOTING_PERIOD),
    ]
    .into_iter()
    .map(|(key, value)| TuningParameter {
        key: key.to_string(),
        value: f64::from(value),
    })
    .collect();
    parameters.sort_by(|a, b| a.key.cmp(&b.key));
    parameters
}

// ============================================================================
// Replay Verification
// ============================================================================

/// Replay verification error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerifyError {
    #[error("build fingerprint mismatch: expected {expected}, got {actual}")]
    BuildMismatch { expected: String, actual: String },

    #[error("invalid replay format: {reason}")]
    InvalidFormat { reason: String },

    #[error(
        "spawn reconstruction mismatch for player {player}: expected entity {expected}, got {actual}"
    )]
    SpawnReconstructionMismatch {
        player: PlayerNumber,
        expected: Entity,
        actual: Entity,
    },

    #[error("input stream invalid: {reason}")]
    InputStreamInvalid { reason: String },

    #[error(
        "checksum mismatch at frame {frame} for player {player}: expected {expected:#06x}, got {actual:#06x}"
    )]
    ChecksumMismatch {
        frame: Frame,
        player: PlayerNumber,
        expected: u32,
        actual: u32,
    },

    #[error("final frame mismatch: expected {expected}, got {actual}")]
    FinalFrameMismatch { expected: Frame, actual: Frame },

    #[error("winner mismatch: expected {expected}, got {actual}")]
    WinnerMismatch { expected: u32, actual: u32 },
}

/// Options for replay verification.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Whether to strictly enforce build fingerprint matching.
    /// - true: fail on mismatch (CI)
    /// - false: warn but continue (dev)
    pub strict_build_check: bool,
    /// Current build fingerprint for comparison.
    pub current_build: Option<BuildFingerprintData>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            strict_build_check: true,
            current_build: None,
        }
    }
}

/// Verify a replay artifact reproduces every recorded checksum.
///
/// # Verification Steps
/// 1. Compare build fingerprints (strict: fail; otherwise warn)
/// 2. Check format, spawn records and input stream integrity
/// 3. Spawn the recorded players and check their entities
/// 4. For each checkpoint, feed the inputs up to its frame, validate, and
///    compare checksums
/// 5. Check the final frame and the winner
pub fn verify_replay(
    artifact: &ReplayArtifact,
    options: &VerifyOptions,
) -> Result<(), VerifyError> {
    if let (Some(recorded), Some(current)) = (&artifact.build_fingerprint, &options.current_build) {
        let mismatch = recorded.binary_sha256 != current.binary_sha256
            || recorded.target_triple != current.target_triple
            || recorded.profile != current.profile;
        if mismatch {
            if options.strict_build_check {
                return Err(VerifyError::BuildMismatch {
                    expected: recorded.binary_sha256.clone(),
                    actual: current.binary_sha256.clone(),
                });
            }
            warn!(
                recorded = %recorded.binary_sha256,
                current = %current.binary_sha256,
                "replay recorded by a different build"
            );
        }
    }

    validate_format(artifact)?;
    validate_input_stream(artifact)?;

    let mut game = GameManager::new();
    for spawn in &artifact.spawns {
        let player = spawn.player_number as PlayerNumber;
        let actual = game.spawn_player(player, Vec2::new(spawn.x, spawn.y), spawn.rotation);
        if actual != spawn.entity {
            return Err(VerifyError::SpawnReconstructionMismatch {
                player,
                expected: spawn.entity,
                actual,
            });
        }
    }

    let mut inputs = artifact.inputs.iter().peekable();
    for checkpoint in &artifact.checkpoints {
        while let Some(frame_inputs) = inputs.next_if(|inputs| inputs.frame <= checkpoint.frame) {
            for (player, &bits) in frame_inputs.inputs.iter().enumerate() {
                game.set_player_input(
                    player as PlayerNumber,
                    PlayerInput::from_bits_retain(bits),
                    frame_inputs.frame,
                );
            }
        }
        game.validate(checkpoint.frame);

        for (player, &expected) in checkpoint.physics_states.iter().enumerate() {
            let player = player as PlayerNumber;
            let actual = u32::from(game.rollback().validate_physics_state(player));
            if actual != expected {
                return Err(VerifyError::ChecksumMismatch {
                    frame: checkpoint.frame,
                    player,
                    expected,
                    actual,
                });
            }
        }
    }

    if game.last_validate_frame() != artifact.final_frame {
        return Err(VerifyError::FinalFrameMismatch {
            expected: artifact.final_frame,
            actual: game.last_validate_frame(),
        });
    }

    if artifact.winner != u32::from(INVALID_PLAYER) {
        let actual = u32::from(game.check_winner());
        if actual != artifact.winner {
            return Err(VerifyError::WinnerMismatch {
                expected: artifact.winner,
                actual,
            });
        }
    }

    Ok(())
}

fn validate_format(artifact: &ReplayArtifact) -> Result<(), VerifyError> {
    let invalid = |reason: String| Err(VerifyError::InvalidFormat { reason });

    if artifact.replay_format_version != REPLAY_FORMAT_VERSION {
        return invalid(format!(
            "unsupported format version {}",
            artifact.replay_format_version
        ));
    }
    if artifact.tick_rate_hz != TICK_RATE_HZ {
        return invalid(format!(
            "tick rate {} Hz, this build simulates at {TICK_RATE_HZ} Hz",
            artifact.tick_rate_hz
        ));
    }
    if artifact.physics_state_algo_id != PHYSICS_STATE_ALGO_ID {
        return invalid(format!(
            "unknown checksum algorithm {:?}",
            artifact.physics_state_algo_id
        ));
    }

    let mut spawned = HashSet::new();
    for spawn in &artifact.spawns {
        if spawn.player_number as usize >= MAX_PLAYER_NMB {
            return invalid(format!("spawn for unknown player {}", spawn.player_number));
        }
        if !spawned.insert(spawn.player_number) {
            return invalid(format!("player {} spawned twice", spawn.player_number));
        }
    }

    let mut previous = 0;
    for checkpoint in &artifact.checkpoints {
        if checkpoint.frame <= previous {
            return invalid(format!("checkpoint frame {} out of order", checkpoint.frame));
        }
        if checkpoint.frame > artifact.final_frame {
            return invalid(format!(
                "checkpoint frame {} past final frame {}",
                checkpoint.frame, artifact.final_frame
            ));
        }
        if checkpoint.frame - previous >= INPUT_WINDOW_SIZE as Frame {
            return invalid(format!(
                "checkpoint gap {}..{} exceeds the input window",
                previous, checkpoint.frame
            ));
        }
        if checkpoint.physics_states.len() != MAX_PLAYER_NMB {
            return invalid(format!(
                "checkpoint at frame {} has {} checksums",
                checkpoint.frame,
                checkpoint.physics_states.len()
            ));
        }
        previous = checkpoint.frame;
    }
    Ok(())
}

/// Validate that every frame `1..=final_frame` has exactly one complete
/// input entry and nothing lies outside that range.
fn validate_input_stream(artifact: &ReplayArtifact) -> Result<(), VerifyError> {
    let invalid = |reason: String| Err(VerifyError::InputStreamInvalid { reason });

    if !artifact.checkpoints.is_empty() && artifact.spawns.len() != MAX_PLAYER_NMB {
        return invalid(format!(
            "{} players spawned, validation needs {MAX_PLAYER_NMB}",
            artifact.spawns.len()
        ));
    }

    let mut expected_frame: Frame = 1;
    for inputs in &artifact.inputs {
        if inputs.frame < expected_frame {
            return invalid(format!("duplicate inputs for frame {}", inputs.frame));
        }
        if inputs.frame > expected_frame {
            return invalid(format!("missing inputs for frame {expected_frame}"));
        }
        if inputs.inputs.len() != MAX_PLAYER_NMB {
            return invalid(format!(
                "frame {} has inputs for {} players",
                inputs.frame,
                inputs.inputs.len()
            ));
        }
        expected_frame += 1;
    }

    let recorded = expected_frame - 1;
    if recorded != artifact.final_frame {
        return invalid(format!(
            "inputs recorded up to frame {recorded}, final frame is {}",
            artifact.final_frame
        ));
    }
    Ok(())
}

// ============================================================================
// Build Fingerprint Acquisition
// ============================================================================

/// Acquire the current build fingerprint.
///
/// # Returns
/// - `Ok(fingerprint)` on success
/// - `Err(io::Error)` if the executable cannot be read
pub fn acquire_build_fingerprint() -> io::Result<BuildFingerprintData> {
    let exe_path = std::env::current_exe()?;

    let mut file = fs::File::open(&exe_path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    let binary_sha256 = format!("{:x}", hasher.finalize());

    let profile = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };

    Ok(BuildFingerprintData {
        binary_sha256,
        target_triple: target_triple(),
        profile: profile.to_string(),
        git_commit: git_commit().unwrap_or_else(|| "unknown".to_string()),
    })
}

/// `<arch>-<os>-<env>` of the running build, e.g. `x86_64-linux-gnu`.
fn target_triple() -> String {
    let env = if cfg!(target_env = "gnu") {
        "gnu"
    } else if cfg!(target_env = "musl") {
        "musl"
    } else if cfg!(target_env = "msvc") {
        "msvc"
    } else {
        "none"
    };
    format!("{}-{}-{env}", std::env::consts::ARCH, std::env::consts::OS)
}

/// Set by CI; there is no fallback to shelling out to git.
fn git_commit() -> Option<String> {
    std::env::var("ASTEROID_GIT_COMMIT").ok()
}

// ============================================================================
// Replay I/O
// ============================================================================

/// Write a replay artifact to a file. Refuses to overwrite.
pub fn write_replay(artifact: &ReplayArtifact, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("replay artifact already exists at {}", path.display()),
                )
            } else {
                e
            }
        })?;
    file.write_all(&artifact.encode_to_vec())?;

    Ok(())
}

/// Read a replay artifact from a file.
pub fn read_replay(path: &Path) -> io::Result<ReplayArtifact> {
    let data = fs::read(path)?;
    ReplayArtifact::decode(data.as_slice()).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("failed to decode replay: {e}"),
        )
    })
}

// ============================================================================
// Tests
// ============================================================================
