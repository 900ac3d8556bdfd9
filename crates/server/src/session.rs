//! Client sessions known to the server.

use asteroid_sim::PlayerNumber;

/// A joined client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSession {
    pub client_id: u64,
    pub player_number: PlayerNumber,
    /// Server clock minus client clock at join time, in milliseconds.
    pub clock_delta_ms: i64,
}

impl ClientSession {
    pub fn new(
        client_id: u64,
        player_number: PlayerNumber,
        server_time_ms: u64,
        client_time_ms: u64,
    ) -> Self {
        Self {
            client_id,
            player_number,
            clock_delta_ms: server_time_ms as i64 - client_time_ms as i64,
        }
    }
}
