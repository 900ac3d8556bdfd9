//! One server and its clients on a simulated clock.
//!
//! Each step delivers the packets due, runs one fixed tick on every client,
//! then flushes every outbox onto the network. Server packets are
//! broadcast to all clients.

use asteroid_client::{ClientConfig, ClientGameManager, ClientState};
use asteroid_replay::BuildFingerprintData;
use asteroid_server::{EndReason, Server, ServerConfig};
use asteroid_sim::{Frame, MAX_PLAYER_NMB, PhysicsState, PlayerNumber, TICK_RATE_HZ};
use asteroid_wire::{Delivery, Packet, ReplayArtifact, WireError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::bot::Bot;
use crate::config::HarnessConfig;
use crate::network::{Endpoint, LoopbackNetwork, NetworkConditions, NetworkStats};

/// Packets recorded by a peer during one step.
pub type Outbox = Vec<(Delivery, Packet)>;

/// Simulated milliseconds per step.
pub const STEP_MS: u64 = 1000 / TICK_RATE_HZ as u64;

/// Steps allowed after the server finishes, for the last packets to land.
const DRAIN_STEPS: u64 = 50;

/// Final state of a match.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub steps: u64,
    pub final_frame: Frame,
    pub physics_states: [PhysicsState; MAX_PLAYER_NMB],
    pub winner: PlayerNumber,
    pub end_reason: EndReason,
    /// Last validated frame of each client.
    pub client_frames: Vec<Frame>,
    pub network: NetworkStats,
    pub replay: Option<ReplayArtifact>,
}

pub struct MatchDriver {
    clock_ms: u64,
    steps: u64,
    max_frames: Frame,
    step_limit: u64,
    network: LoopbackNetwork,
    server: Server<Outbox>,
    clients: Vec<ClientGameManager<Outbox>>,
    bots: Vec<Bot>,
}

impl MatchDriver {
    pub fn new(config: &HarnessConfig) -> Self {
        let conditions = NetworkConditions {
            reliable_latency_ms: config.reliable_latency_ms,
            unreliable_latency_ms: config.unreliable_latency_ms,
            unreliable_margin_ms: config.unreliable_margin_ms,
            packet_loss: config.packet_loss,
        };
        Self::with_conditions(config, conditions)
    }

    pub fn with_conditions(config: &HarnessConfig, conditions: NetworkConditions) -> Self {
        let mut seeds = ChaCha8Rng::seed_from_u64(config.seed);
        let network = LoopbackNetwork::new(conditions, seeds.r#gen());

        let server_config = ServerConfig {
            start_delay_ms: config.start_delay_ms,
            record_replay: true,
        };
        let server = Server::new(server_config, Outbox::new());

        let mut clients = Vec::with_capacity(MAX_PLAYER_NMB);
        let mut bots = Vec::with_capacity(MAX_PLAYER_NMB);
        for _ in 0..MAX_PLAYER_NMB {
            let mut client =
                ClientGameManager::new(ClientConfig::default(), seeds.r#gen(), Outbox::new());
            client.join(0);
            clients.push(client);
            bots.push(Bot::new(seeds.r#gen()));
        }

        // Generous: joins, start delay, then a few steps per frame.
        let step_limit = (config.start_delay_ms + 10 * config.reliable_latency_ms) / STEP_MS
            + 4 * u64::from(config.max_frames)
            + DRAIN_STEPS;

        let mut driver = Self {
            clock_ms: 0,
            steps: 0,
            max_frames: config.max_frames,
            step_limit,
            network,
            server,
            clients,
            bots,
        };
        driver.flush();
        driver
    }

    pub fn set_build_fingerprint(&mut self, fingerprint: BuildFingerprintData) {
        self.server.set_build_fingerprint(fingerprint);
    }

    /// Advance the clock by one step.
    pub fn step(&mut self) -> Result<(), WireError> {
        for (to, packet) in self.network.deliver_due(self.clock_ms)? {
            match to {
                Endpoint::Server => self.server.receive_packet(packet, self.clock_ms),
                Endpoint::Client(index) => self.clients[index].receive_packet(packet),
            }
        }

        for (client, bot) in self.clients.iter_mut().zip(&mut self.bots) {
            if client.state().contains(ClientState::STARTED) {
                client.set_local_input(bot.next_input());
            }
            client.fixed_update(self.clock_ms);
        }

        self.flush();
        self.clock_ms += STEP_MS;
        self.steps += 1;
        Ok(())
    }

    fn flush(&mut self) {
        for (delivery, packet) in self.server.sender_mut().drain(..) {
            for index in 0..self.clients.len() {
                self.network
                    .send(Endpoint::Client(index), delivery, &packet, self.clock_ms);
            }
        }
        for client in &mut self.clients {
            for (delivery, packet) in client.sender_mut().drain(..) {
                self.network
                    .send(Endpoint::Server, delivery, &packet, self.clock_ms);
            }
        }
    }

    /// Server finished and every client heard about it, or the frame
    /// budget is spent.
    pub fn is_done(&self) -> bool {
        let all_finished =
            self.server.is_finished() && self.clients.iter().all(|client| client.is_finished());
        all_finished || self.server.last_validate_frame() >= self.max_frames
    }

    /// Step until done or out of steps.
    pub fn run(&mut self) -> Result<(), WireError> {
        while !self.is_done() {
            if self.steps >= self.step_limit {
                warn!(
                    steps = self.steps,
                    last_validate_frame = self.server.last_validate_frame(),
                    "step limit reached"
                );
                break;
            }
            self.step()?;
            if self.steps % 250 == 0 {
                debug!(
                    steps = self.steps,
                    server_frame = self.server.last_validate_frame(),
                    in_flight = self.network.in_flight(),
                    "match progress"
                );
            }
        }
        info!(
            steps = self.steps,
            final_frame = self.server.last_validate_frame(),
            "match stopped"
        );
        Ok(())
    }

    pub fn server(&self) -> &Server<Outbox> {
        &self.server
    }

    pub fn clients(&self) -> &[ClientGameManager<Outbox>] {
        &self.clients
    }

    pub fn clock_ms(&self) -> u64 {
        self.clock_ms
    }

    pub fn finish(self) -> MatchOutcome {
        let game = self.server.game();
        let final_frame = game.last_validate_frame();
        let physics_states = game.physics_states();
        let winner = game.winner();
        let end_reason = self.server.end_reason().unwrap_or(EndReason::Aborted);
        let client_frames = self
            .clients
            .iter()
            .map(|client| client.last_validate_frame())
            .collect();
        let network = self.network.stats();
        let replay = self.server.finalize(end_reason);

        MatchOutcome {
            steps: self.steps,
            final_frame,
            physics_states,
            winner,
            end_reason,
            client_frames,
            network,
            replay,
        }
    }
}
