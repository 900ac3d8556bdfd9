//! Per-player input history indexed by "frames back from the newest frame".
//!
//! Slot `0` holds the input for `current_frame`, slot `n` the input for
//! `current_frame - n`. Every slot is always defined: frames nobody has
//! reported yet hold the last known input.

use tracing::warn;

use crate::input::PlayerInput;
use crate::{Frame, INPUT_WINDOW_SIZE, MAX_PLAYER_NMB, PlayerNumber};

#[derive(Debug, Clone)]
pub struct InputWindow {
    current_frame: Frame,
    last_received_frame: [Frame; MAX_PLAYER_NMB],
    inputs: [[PlayerInput; INPUT_WINDOW_SIZE]; MAX_PLAYER_NMB],
}

impl Default for InputWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl InputWindow {
    pub fn new() -> Self {
        Self {
            current_frame: 0,
            last_received_frame: [0; MAX_PLAYER_NMB],
            inputs: [[PlayerInput::empty(); INPUT_WINDOW_SIZE]; MAX_PLAYER_NMB],
        }
    }

    /// Newest frame the window covers.
    pub fn current_frame(&self) -> Frame {
        self.current_frame
    }

    /// Oldest frame still held by the window.
    pub fn oldest_frame(&self) -> Frame {
        self.current_frame
            .saturating_sub(INPUT_WINDOW_SIZE as Frame - 1)
    }

    pub fn last_received_frame(&self, player: PlayerNumber) -> Frame {
        self.last_received_frame[player_index(player)]
    }

    /// Lowest `last_received_frame` across all players.
    pub fn min_last_received_frame(&self) -> Frame {
        self.last_received_frame
            .iter()
            .copied()
            .min()
            .unwrap_or(self.current_frame)
    }

    /// Record `input` for `player` at `frame`.
    ///
    /// Moves the window forward first when `frame` is newer than
    /// `current_frame`. When `frame` is past the player's previous frontier,
    /// the frames between the old frontier and `frame`, and the frames after
    /// `frame` up to `current_frame`, are filled with the same input.
    /// Frames that fell out of the window are dropped.
    pub fn set_player_input(&mut self, player: PlayerNumber, input: PlayerInput, frame: Frame) {
        let index = player_index(player);
        if frame > self.current_frame {
            self.start_new_frame(frame);
        }

        let back = (self.current_frame - frame) as usize;
        if back >= INPUT_WINDOW_SIZE {
            warn!(
                player,
                frame,
                current_frame = self.current_frame,
                "input frame outside of the input window, dropped"
            );
            return;
        }

        let current = self.current_frame;
        let oldest = self.oldest_frame();
        let last_received = self.last_received_frame[index];
        let inputs = &mut self.inputs[index];
        inputs[back] = input;

        if last_received < frame {
            let first_missing = (last_received + 1).max(oldest);
            for missing in first_missing..frame {
                inputs[(current - missing) as usize] = input;
            }
            inputs[..back].fill(input);
            self.last_received_frame[index] = frame;
        }
    }

    /// Age the window so that `new_frame` becomes the newest frame.
    ///
    /// Newly exposed slots repeat the previous newest input. A no-op when
    /// `new_frame` is not ahead of `current_frame`.
    pub fn start_new_frame(&mut self, new_frame: Frame) {
        if new_frame <= self.current_frame {
            return;
        }
        let delta = (new_frame - self.current_frame) as usize;
        for inputs in &mut self.inputs {
            let newest = inputs[0];
            if delta >= INPUT_WINDOW_SIZE {
                inputs.fill(newest);
            } else {
                inputs.copy_within(0..INPUT_WINDOW_SIZE - delta, delta);
                inputs[..delta].fill(newest);
            }
        }
        self.current_frame = new_frame;
    }

    /// Input for `player` at `frame`.
    ///
    /// # Panics
    /// If `frame` is ahead of `current_frame` or older than the window.
    pub fn input_at_frame(&self, player: PlayerNumber, frame: Frame) -> PlayerInput {
        assert!(
            self.contains_frame(frame),
            "frame {frame} outside input window [{}, {}]",
            self.oldest_frame(),
            self.current_frame
        );
        self.inputs[player_index(player)][(self.current_frame - frame) as usize]
    }

    pub fn contains_frame(&self, frame: Frame) -> bool {
        frame <= self.current_frame && self.current_frame - frame < INPUT_WINDOW_SIZE as Frame
    }

    /// Raw history for `player`, slot 0 being `current_frame`.
    pub fn inputs(&self, player: PlayerNumber) -> &[PlayerInput; INPUT_WINDOW_SIZE] {
        &self.inputs[player_index(player)]
    }
}

fn player_index(player: PlayerNumber) -> usize {
    let index = usize::from(player);
    assert!(
        index < MAX_PLAYER_NMB,
        "player number {player} out of range (max {MAX_PLAYER_NMB})"
    );
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    const X: PlayerInput = PlayerInput::UP;
    const Y: PlayerInput = PlayerInput::SHOOT;

    #[test]
    fn test_backfill_from_last_received_frontier() {
        let mut window = InputWindow::new();
        window.set_player_input(0, Y, 15);
        assert_eq!(window.last_received_frame(0), 15);

        window.set_player_input(0, X, 20);

        assert_eq!(window.last_received_frame(0), 20);
        for frame in 16..=20 {
            assert_eq!(window.input_at_frame(0, frame), X, "frame {frame}");
        }
        assert_eq!(window.input_at_frame(0, 17), X);
        assert_eq!(window.input_at_frame(0, 15), Y);
    }

    #[test]
    fn test_forward_fill_up_to_current_frame() {
        let mut window = InputWindow::new();
        window.start_new_frame(10);
        window.set_player_input(1, X, 6);

        for frame in 6..=10 {
            assert_eq!(window.input_at_frame(1, frame), X);
        }
        assert_eq!(window.last_received_frame(1), 6);
        assert_eq!(window.current_frame(), 10);
    }

    #[test]
    fn test_older_input_does_not_move_frontier_or_fill() {
        let mut window = InputWindow::new();
        window.set_player_input(0, X, 8);
        window.set_player_input(0, Y, 5);

        assert_eq!(window.last_received_frame(0), 8);
        assert_eq!(window.input_at_frame(0, 5), Y);
        assert_eq!(window.input_at_frame(0, 6), X);
        assert_eq!(window.input_at_frame(0, 8), X);
    }

    #[test]
    fn test_redundant_packet_masks_loss() {
        // Newest-first feed of a 50-frame packet ending at frame 7: the
        // packet covering frames 1..6 never arrived.
        let mut window = InputWindow::new();
        for back in 0..50u32 {
            let Some(frame) = 7u32.checked_sub(back) else {
                break;
            };
            let input = if frame % 2 == 0 { X } else { Y };
            window.set_player_input(0, input, frame);
        }

        assert_eq!(window.last_received_frame(0), 7);
        for frame in 1..=7 {
            let expected = if frame % 2 == 0 { X } else { Y };
            assert_eq!(window.input_at_frame(0, frame), expected);
        }
    }

    #[test]
    fn test_start_new_frame_repeats_newest_input() {
        let mut window = InputWindow::new();
        window.set_player_input(0, Y, 0);
        window.set_player_input(0, X, 3);
        window.start_new_frame(5);

        assert_eq!(window.current_frame(), 5);
        assert_eq!(window.input_at_frame(0, 5), X);
        assert_eq!(window.input_at_frame(0, 4), X);
        assert_eq!(window.input_at_frame(0, 3), X);
        assert_eq!(window.input_at_frame(0, 0), Y);
    }

    #[test]
    fn test_start_new_frame_backwards_is_noop() {
        let mut window = InputWindow::new();
        window.set_player_input(0, X, 12);
        let before = *window.inputs(0);

        window.start_new_frame(12);
        window.start_new_frame(3);

        assert_eq!(window.current_frame(), 12);
        assert_eq!(*window.inputs(0), before);
    }

    #[test]
    fn test_jump_past_window_refills_everything() {
        let mut window = InputWindow::new();
        window.set_player_input(0, Y, 0);
        window.set_player_input(0, X, 1);

        window.start_new_frame(1 + INPUT_WINDOW_SIZE as Frame * 2);

        assert!(window.inputs(0).iter().all(|&input| input == X));
    }

    #[test]
    fn test_input_outside_window_is_dropped() {
        let mut window = InputWindow::new();
        window.start_new_frame(400);
        window.set_player_input(0, X, 100);

        assert_eq!(window.last_received_frame(0), 0);
        assert!(!window.contains_frame(100));
        assert!(window.contains_frame(151));
        assert!(!window.contains_frame(150));
    }

    #[test]
    #[should_panic(expected = "outside input window")]
    fn test_input_at_future_frame_panics() {
        let window = InputWindow::new();
        let _ = window.input_at_frame(0, 1);
    }

    #[test]
    fn test_min_last_received_frame() {
        let mut window = InputWindow::new();
        window.set_player_input(0, X, 9);
        window.set_player_input(1, X, 4);
        assert_eq!(window.min_last_received_frame(), 4);
    }
}
