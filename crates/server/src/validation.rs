//! Input packet validation for the server edge.
//!
//! - Unknown player: DROP
//! - Match not started or already finished: DROP
//! - Frame past the resimulation cap: DROP

use asteroid_sim::{Frame, INPUT_WINDOW_SIZE};
use asteroid_wire::PlayerInputPacket;

/// Result of input validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationResult {
    /// Input fed to the input window and relayed.
    Accepted,
    /// Dropped: no client joined with this player number.
    DroppedUnknownPlayer,
    /// Dropped: received before every player joined.
    DroppedNotStarted,
    /// Dropped: received after the match ended.
    DroppedFinished,
    /// Dropped: frame would push the input window past the last validated
    /// frame.
    DroppedBeyondWindow { frame: Frame, max: Frame },
}

impl ValidationResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Match-level facts an input packet is checked against.
#[derive(Debug, Clone, Copy)]
pub struct MatchStatus {
    pub joined_players: usize,
    pub started: bool,
    pub finished: bool,
    pub last_validate_frame: Frame,
}

/// Newest frame the server accepts input for: the window must still hold
/// `last_validate_frame + 1` once the frame is written.
pub fn max_input_frame(last_validate_frame: Frame) -> Frame {
    last_validate_frame + INPUT_WINDOW_SIZE as Frame - 1
}

pub fn validate_input(packet: &PlayerInputPacket, status: MatchStatus) -> ValidationResult {
    if usize::from(packet.player_number) >= status.joined_players {
        return ValidationResult::DroppedUnknownPlayer;
    }
    if !status.started {
        return ValidationResult::DroppedNotStarted;
    }
    if status.finished {
        return ValidationResult::DroppedFinished;
    }
    let max = max_input_frame(status.last_validate_frame);
    if packet.current_frame > max {
        return ValidationResult::DroppedBeyondWindow {
            frame: packet.current_frame,
            max,
        };
    }
    ValidationResult::Accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use asteroid_sim::PlayerInput;

    fn running(last_validate_frame: Frame) -> MatchStatus {
        MatchStatus {
            joined_players: 2,
            started: true,
            finished: false,
            last_validate_frame,
        }
    }

    fn packet(player_number: u8, current_frame: Frame) -> PlayerInputPacket {
        PlayerInputPacket::new(player_number, current_frame, |_| PlayerInput::UP)
    }

    #[test]
    fn test_accepts_in_window() {
        assert!(validate_input(&packet(1, 30), running(10)).is_accepted());
        assert!(validate_input(&packet(0, 259), running(10)).is_accepted());
    }

    #[test]
    fn test_drops_beyond_window() {
        assert_eq!(
            validate_input(&packet(0, 260), running(10)),
            ValidationResult::DroppedBeyondWindow {
                frame: 260,
                max: 259
            }
        );
    }

    #[test]
    fn test_drops_unknown_player() {
        let status = MatchStatus {
            joined_players: 1,
            started: false,
            finished: false,
            last_validate_frame: 0,
        };
        assert_eq!(
            validate_input(&packet(1, 3), status),
            ValidationResult::DroppedUnknownPlayer
        );
    }

    #[test]
    fn test_drops_before_start_and_after_finish() {
        let mut status = running(0);
        status.started = false;
        assert_eq!(
            validate_input(&packet(0, 3), status),
            ValidationResult::DroppedNotStarted
        );

        let mut status = running(0);
        status.finished = true;
        assert_eq!(
            validate_input(&packet(0, 3), status),
            ValidationResult::DroppedFinished
        );
    }
}
