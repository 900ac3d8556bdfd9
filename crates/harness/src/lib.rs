//! Asteroid Loopback Harness
//!
//! Runs a full match in one process: a server, `MAX_PLAYER_NMB` clients
//! played by seeded bots, and a simulated network between them. Clients
//! assert on any desync, so a completed run is a determinism check across
//! every peer.
//!
//! - [`config`]: environment configuration
//! - [`network`]: latency and loss model over the wire codec
//! - [`bot`]: seeded input scripts
//! - [`driver`]: the stepped match

#![deny(unsafe_code)]

pub mod bot;
pub mod config;
pub mod driver;
pub mod network;

pub use config::{ConfigError, HarnessConfig};
pub use driver::{MatchDriver, MatchOutcome};
pub use network::{Endpoint, LoopbackNetwork, NetworkConditions, NetworkStats};
