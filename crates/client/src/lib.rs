//! Asteroid Client Edge
//!
//! Runs the local prediction loop: every fixed tick the client writes its
//! own input, resimulates from the last validated state up to the current
//! frame and sends its recent input history to the server. Validate packets
//! from the server confirm frames and compare checksums.
//!
//! The client never corrects a desync. A checksum mismatch is fatal.
//!
//! # Threading
//!
//! All entry points take `&mut self`. When network receipt and the tick
//! loop run on different threads, share the client as a [`SharedClient`]
//! so that every call into the rollback state goes through one lock.

#![deny(unsafe_code)]

use std::sync::Arc;

use asteroid_sim::transform::TransformManager;
use asteroid_sim::{
    FIXED_PERIOD, Frame, GameManager, INPUT_WINDOW_SIZE, INVALID_PLAYER, MAX_PLAYER_NMB,
    PlayerInput, PlayerNumber, Vec2,
};
use asteroid_wire::{
    JoinPacket, Packet, PacketSender, PlayerInputPacket, SpawnPlayerPacket, ValidateFramePacket,
};
use bitflags::bitflags;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

// ============================================================================
// Parameters
// ============================================================================

/// Frames the client may run ahead of its last validated frame before it
/// stops advancing (3 s at 50 Hz).
pub const MAX_PREDICTION_FRAMES: Frame = 150;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub max_prediction_frames: Frame,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_prediction_frames: MAX_PREDICTION_FRAMES,
        }
    }
}

bitflags! {
    /// Match lifecycle as seen by a client.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClientState: u8 {
        const STARTED = 1 << 0;
        const FINISHED = 1 << 1;
    }
}

/// A client behind the single lock the rollback state requires.
pub type SharedClient<S> = Arc<Mutex<ClientGameManager<S>>>;

// ============================================================================
// Client Game Manager
// ============================================================================

pub struct ClientGameManager<S: PacketSender> {
    config: ClientConfig,
    sender: S,
    game: GameManager,
    client_id: u64,
    player_number: PlayerNumber,
    state: ClientState,
    start_time_ms: Option<u64>,
    fixed_timer: f32,
    local_input: PlayerInput,
}

impl<S: PacketSender> ClientGameManager<S> {
    pub fn new(config: ClientConfig, client_id: u64, sender: S) -> Self {
        Self {
            config,
            sender,
            game: GameManager::new(),
            client_id,
            player_number: INVALID_PLAYER,
            state: ClientState::empty(),
            start_time_ms: None,
            fixed_timer: 0.0,
            local_input: PlayerInput::empty(),
        }
    }

    pub fn into_shared(self) -> SharedClient<S> {
        Arc::new(Mutex::new(self))
    }

    /// Ask the server for a seat.
    pub fn join(&mut self, now_ms: u64) {
        self.sender.send_reliable_packet(Packet::Join(JoinPacket {
            client_id: self.client_id,
            client_time_ms: now_ms,
        }));
    }

    /// Input held for every following tick until changed.
    pub fn set_local_input(&mut self, input: PlayerInput) {
        self.local_input = input;
    }

    /// Advance wall time by `dt` seconds, running one fixed tick per
    /// elapsed period.
    pub fn update(&mut self, dt: f32, now_ms: u64) {
        self.fixed_timer += dt;
        while self.fixed_timer >= FIXED_PERIOD {
            self.fixed_timer -= FIXED_PERIOD;
            self.fixed_update(now_ms);
        }
    }

    /// One simulation tick.
    pub fn fixed_update(&mut self, now_ms: u64) {
        if self.state.contains(ClientState::FINISHED) {
            return;
        }
        if !self.state.contains(ClientState::STARTED) {
            match self.start_time_ms {
                Some(start_time_ms) if now_ms >= start_time_ms => {
                    info!(client_id = self.client_id, player = self.player_number, "match started");
                    self.state |= ClientState::STARTED;
                }
                _ => return,
            }
        }
        if self.player_number == INVALID_PLAYER {
            return;
        }

        let current_frame = self.game.current_frame();
        let last_validate_frame = self.game.last_validate_frame();
        if current_frame - last_validate_frame >= self.config.max_prediction_frames {
            warn!(
                current_frame,
                last_validate_frame, "prediction limit reached, waiting for validation"
            );
            return;
        }

        self.game
            .set_player_input(self.player_number, self.local_input, current_frame);
        self.game.simulate_to_current_frame();

        let window = self.game.rollback().input_window();
        let player = self.player_number;
        let packet = PlayerInputPacket::new(player, current_frame, |frame| {
            if window.contains_frame(frame) {
                window.input_at_frame(player, frame)
            } else {
                PlayerInput::empty()
            }
        });
        self.sender.send_unreliable_packet(Packet::Input(packet));

        self.game.advance_frame();
    }

    /// Handle one decoded packet from the server.
    pub fn receive_packet(&mut self, packet: Packet) {
        match packet {
            Packet::JoinAck(ack) => {
                if ack.client_id == self.client_id {
                    self.adopt_player_number(ack.player_number);
                }
            }
            Packet::SpawnPlayer(spawn) => self.receive_spawn(spawn),
            Packet::StartGame(start) => {
                debug!(start_time_ms = start.start_time_ms, "start time received");
                self.start_time_ms = Some(start.start_time_ms);
            }
            Packet::Input(input) => self.receive_input(input),
            Packet::ValidateState(validate) => self.receive_validate(validate),
            Packet::WinGame(win) => {
                let winner = PlayerNumber::try_from(win.winner).unwrap_or(INVALID_PLAYER);
                self.game.win_game(winner);
                self.state |= ClientState::FINISHED;
            }
            Packet::Join(_) => warn!("unexpected join packet on client"),
        }
    }

    fn adopt_player_number(&mut self, player_number: u32) {
        if self.player_number != INVALID_PLAYER {
            return;
        }
        // Decoding rejects out-of-range player numbers.
        self.player_number = player_number as PlayerNumber;
        info!(client_id = self.client_id, player = self.player_number, "player number assigned");
    }

    fn receive_spawn(&mut self, spawn: SpawnPlayerPacket) {
        if spawn.client_id == self.client_id {
            self.adopt_player_number(spawn.player_number);
        }
        self.game.spawn_player(
            spawn.player_number as PlayerNumber,
            Vec2::new(spawn.x, spawn.y),
            spawn.rotation,
        );
    }

    fn receive_input(&mut self, packet: PlayerInputPacket) {
        let player = packet.player_number;
        if player == self.player_number {
            // Relayed copy of our own history: it must match what we sent.
            let window = self.game.rollback().input_window();
            for (frame, input) in packet.frames() {
                if !window.contains_frame(frame) {
                    continue;
                }
                assert_eq!(
                    window.input_at_frame(player, frame),
                    input,
                    "own input echo diverged at frame {frame}"
                );
            }
            return;
        }

        let last_received = self.game.rollback().last_received_frame(player);
        if packet.current_frame <= last_received {
            debug!(
                player,
                frame = packet.current_frame,
                last_received,
                "stale input packet discarded"
            );
            return;
        }

        let max_frame = self.game.last_validate_frame() + INPUT_WINDOW_SIZE as Frame - 1;
        if packet.current_frame > max_frame {
            warn!(
                player,
                frame = packet.current_frame,
                max_frame,
                "input frames beyond the input window skipped"
            );
        }
        let frames = packet
            .frames()
            .filter(|&(frame, _)| frame <= max_frame)
            .take_while(|&(frame, _)| frame > last_received);
        for (frame, input) in frames {
            self.game.set_player_input(player, input, frame);
        }
    }

    fn receive_validate(&mut self, packet: ValidateFramePacket) {
        let new_validate_frame = packet.new_validate_frame;
        let last_validate_frame = self.game.last_validate_frame();
        if new_validate_frame <= last_validate_frame {
            debug!(
                new_validate_frame,
                last_validate_frame, "stale validate packet ignored"
            );
            return;
        }

        let rollback = self.game.rollback();
        let missing = (0..MAX_PLAYER_NMB as PlayerNumber)
            .find(|&player| rollback.last_received_frame(player) < new_validate_frame);
        if let Some(player) = missing {
            debug!(
                new_validate_frame,
                player,
                last_received = rollback.last_received_frame(player),
                "inputs missing, validation deferred"
            );
            return;
        }

        self.game.confirm(new_validate_frame, &packet.physics_states);
    }

    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    pub fn player_number(&self) -> PlayerNumber {
        self.player_number
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state.contains(ClientState::FINISHED)
    }

    pub fn current_frame(&self) -> Frame {
        self.game.current_frame()
    }

    pub fn last_validate_frame(&self) -> Frame {
        self.game.last_validate_frame()
    }

    pub fn winner(&self) -> PlayerNumber {
        self.game.winner()
    }

    /// Predicted transforms for rendering.
    pub fn transforms(&self) -> &TransformManager {
        self.game.transforms()
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
}

// ============================================================================
// Tests
// ============================================================================
