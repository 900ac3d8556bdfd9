//! Asteroid Server Edge
//!
//! The server owns the authoritative copy of the match. It does not run a
//! clock of its own: it advances only when inputs arrive.
//!
//! - Session management (join, player numbers, spawn and start broadcast)
//! - Input validation and relay
//! - Frame validation at the lowest input frontier of all players
//! - Winner detection
//! - Replay recording
//!
//! Every packet the server sends is a broadcast. Clients pick the packets
//! meant for them by `client_id`.

#![deny(unsafe_code)]

pub mod session;
pub mod validation;

use asteroid_replay::{BuildFingerprintData, ReplayRecorder};
use asteroid_sim::{
    Frame, GameManager, INVALID_PLAYER, MAX_PLAYER_NMB, PlayerNumber, spawn_position,
    spawn_rotation,
};
use asteroid_wire::{
    JoinAckPacket, JoinPacket, Packet, PacketSender, PlayerInputPacket, ReplayArtifact,
    SpawnPlayerPacket, StartGamePacket, ValidateFramePacket, WinGamePacket,
};
use tracing::{debug, info, warn};

use session::ClientSession;
use validation::{MatchStatus, ValidationResult, validate_input};

// ============================================================================
// Parameters
// ============================================================================

/// Delay between the last join and the match start.
pub const START_DELAY_MS: u64 = 3000;

// ============================================================================
// Match End Reason
// ============================================================================

/// Reason for match termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// One player left standing.
    Complete,
    /// A client went away.
    Disconnect,
    /// Stopped from outside before anyone won.
    Aborted,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Disconnect => "disconnect",
            Self::Aborted => "aborted",
        }
    }
}

// ============================================================================
// Server State
// ============================================================================

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub start_delay_ms: u64,
    pub record_replay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            start_delay_ms: START_DELAY_MS,
            record_replay: true,
        }
    }
}

/// Server state for running a match.
pub struct Server<S: PacketSender> {
    config: ServerConfig,
    sender: S,
    game: GameManager,
    /// Joined clients, indexed by player number.
    sessions: Vec<ClientSession>,
    start_time_ms: Option<u64>,
    end_reason: Option<EndReason>,
    replay_recorder: Option<ReplayRecorder>,
}

impl<S: PacketSender> Server<S> {
    pub fn new(config: ServerConfig, sender: S) -> Self {
        let replay_recorder = config.record_replay.then(ReplayRecorder::new);
        Self {
            config,
            sender,
            game: GameManager::new(),
            sessions: Vec::with_capacity(MAX_PLAYER_NMB),
            start_time_ms: None,
            end_reason: None,
            replay_recorder,
        }
    }

    /// Set the build fingerprint stored in the replay.
    pub fn set_build_fingerprint(&mut self, fingerprint: BuildFingerprintData) {
        if let Some(recorder) = &mut self.replay_recorder {
            recorder.set_build_fingerprint(fingerprint);
        }
    }

    /// Handle one decoded packet received at server time `now_ms`.
    pub fn receive_packet(&mut self, packet: Packet, now_ms: u64) {
        match packet {
            Packet::Join(join) => self.receive_join(join, now_ms),
            Packet::Input(input) => {
                self.receive_input(input);
            }
            other => warn!(packet_type = ?other.packet_type(), "unexpected packet on server"),
        }
    }

    fn receive_join(&mut self, join: JoinPacket, now_ms: u64) {
        if let Some(session) = self.session_by_client(join.client_id) {
            let player_number = session.player_number;
            debug!(client_id = join.client_id, player_number, "repeated join");
            self.send_join_ack(join.client_id, player_number);
            return;
        }
        if self.sessions.len() >= MAX_PLAYER_NMB {
            warn!(client_id = join.client_id, "match full, join ignored");
            return;
        }

        let player_number = self.sessions.len() as PlayerNumber;
        let session = ClientSession::new(join.client_id, player_number, now_ms, join.client_time_ms);
        info!(
            client_id = session.client_id,
            player_number,
            clock_delta_ms = session.clock_delta_ms,
            "client joined"
        );
        self.sessions.push(session);
        self.send_join_ack(join.client_id, player_number);

        let position = spawn_position(player_number);
        let rotation = spawn_rotation(player_number);
        let entity = self.game.spawn_player(player_number, position, rotation);
        if let Some(recorder) = &mut self.replay_recorder {
            recorder.record_spawn(player_number, entity, position, rotation);
        }

        // Late joiners also need the players that came before them.
        for session in &self.sessions {
            let position = spawn_position(session.player_number);
            self.sender
                .send_reliable_packet(Packet::SpawnPlayer(SpawnPlayerPacket {
                    client_id: session.client_id,
                    player_number: u32::from(session.player_number),
                    x: position.x,
                    y: position.y,
                    rotation: spawn_rotation(session.player_number),
                }));
        }

        if self.sessions.len() == MAX_PLAYER_NMB {
            let start_time_ms = now_ms + self.config.start_delay_ms;
            info!(start_time_ms, "all players joined, starting match");
            self.start_time_ms = Some(start_time_ms);
            self.sender
                .send_reliable_packet(Packet::StartGame(StartGamePacket { start_time_ms }));
        }
    }

    /// Feed an input packet, relay it to every client and validate as far
    /// as the inputs of all players allow.
    pub fn receive_input(&mut self, packet: PlayerInputPacket) -> ValidationResult {
        let result = validate_input(&packet, self.status());
        if !result.is_accepted() {
            warn!(
                player = packet.player_number,
                frame = packet.current_frame,
                ?result,
                "input packet dropped"
            );
            return result;
        }

        // Frames at or before the frontier are already known.
        let last_received = self.game.rollback().last_received_frame(packet.player_number);
        for (frame, input) in packet.frames().take_while(|&(frame, _)| frame > last_received) {
            self.game
                .set_player_input(packet.player_number, input, frame);
        }

        self.sender.send_unreliable_packet(Packet::Input(packet));
        self.try_validate();
        result
    }

    fn try_validate(&mut self) {
        let frontier = self
            .game
            .rollback()
            .input_window()
            .min_last_received_frame();
        if frontier <= self.game.last_validate_frame() {
            return;
        }

        self.game.validate(frontier);
        let physics_states = self.game.physics_states();
        debug!(frame = frontier, ?physics_states, "frame validated");

        if let Some(recorder) = &mut self.replay_recorder {
            let rollback = self.game.rollback();
            for frame in recorder.recorded_frame() + 1..=frontier {
                let inputs = std::array::from_fn(|player| {
                    rollback.input_at_frame(player as PlayerNumber, frame)
                });
                recorder.record_frame_inputs(frame, inputs);
            }
            recorder.record_checkpoint(frontier, &physics_states);
        }

        self.sender
            .send_unreliable_packet(Packet::ValidateState(ValidateFramePacket {
                new_validate_frame: frontier,
                physics_states,
            }));

        let winner = self.game.check_winner();
        if winner != INVALID_PLAYER {
            self.game.win_game(winner);
            self.send_win(winner);
            self.end_reason = Some(EndReason::Complete);
        }
    }

    /// A client went away: the match ends without a winner.
    pub fn disconnect(&mut self, client_id: u64) {
        if self.is_finished() || self.session_by_client(client_id).is_none() {
            return;
        }
        info!(client_id, "client disconnected, ending match");
        self.send_win(INVALID_PLAYER);
        self.end_reason = Some(EndReason::Disconnect);
    }

    fn send_join_ack(&mut self, client_id: u64, player_number: PlayerNumber) {
        self.sender.send_reliable_packet(Packet::JoinAck(JoinAckPacket {
            client_id,
            player_number: u32::from(player_number),
        }));
    }

    fn send_win(&mut self, winner: PlayerNumber) {
        self.sender.send_reliable_packet(Packet::WinGame(WinGamePacket {
            winner: u32::from(winner),
        }));
    }

    fn session_by_client(&self, client_id: u64) -> Option<&ClientSession> {
        self.sessions
            .iter()
            .find(|session| session.client_id == client_id)
    }

    fn status(&self) -> MatchStatus {
        MatchStatus {
            joined_players: self.sessions.len(),
            started: self.start_time_ms.is_some(),
            finished: self.is_finished(),
            last_validate_frame: self.game.last_validate_frame(),
        }
    }

    pub fn is_started(&self) -> bool {
        self.start_time_ms.is_some()
    }

    pub fn start_time_ms(&self) -> Option<u64> {
        self.start_time_ms
    }

    pub fn is_finished(&self) -> bool {
        self.end_reason.is_some()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    pub fn last_validate_frame(&self) -> Frame {
        self.game.last_validate_frame()
    }

    pub fn sessions(&self) -> &[ClientSession] {
        &self.sessions
    }

    pub fn game(&self) -> &GameManager {
        &self.game
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    pub fn sender_mut(&mut self) -> &mut S {
        &mut self.sender
    }

    /// Finalize the match and produce a replay artifact, if recording.
    ///
    /// `end_reason` is used when the match has not ended on its own.
    pub fn finalize(self, end_reason: EndReason) -> Option<ReplayArtifact> {
        let end_reason = self.end_reason.unwrap_or(end_reason);
        let winner = self.game.winner();
        self.replay_recorder
            .map(|recorder| recorder.finalize(winner, end_reason.as_str()))
    }
}

// ============================================================================
// Tests
// ============================================================================
