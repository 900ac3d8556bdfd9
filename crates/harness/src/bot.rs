//! Scripted players driven by a seeded RNG.

use asteroid_sim::PlayerInput;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const MIN_HOLD_TICKS: u32 = 5;
const MAX_HOLD_TICKS: u32 = 40;

/// Picks an input and holds it for a random number of ticks, the way a
/// person taps and holds keys.
#[derive(Debug, Clone)]
pub struct Bot {
    rng: ChaCha8Rng,
    input: PlayerInput,
    hold_ticks: u32,
}

impl Bot {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            input: PlayerInput::empty(),
            hold_ticks: 0,
        }
    }

    /// Input for the next tick.
    pub fn next_input(&mut self) -> PlayerInput {
        if self.hold_ticks == 0 {
            self.input = self.pick();
            self.hold_ticks = self.rng.gen_range(MIN_HOLD_TICKS..=MAX_HOLD_TICKS);
        }
        self.hold_ticks -= 1;
        self.input
    }

    fn pick(&mut self) -> PlayerInput {
        let mut input = match self.rng.gen_range(0..4) {
            0 => PlayerInput::LEFT,
            1 => PlayerInput::RIGHT,
            _ => PlayerInput::empty(),
        };
        if self.rng.gen_bool(0.5) {
            input |= PlayerInput::UP;
        } else if self.rng.gen_bool(0.2) {
            input |= PlayerInput::DOWN;
        }
        if self.rng.gen_bool(0.6) {
            input |= PlayerInput::SHOOT;
        }
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_inputs() {
        let mut a = Bot::new(11);
        let mut b = Bot::new(11);
        for _ in 0..500 {
            assert_eq!(a.next_input(), b.next_input());
        }
    }

    #[test]
    fn test_inputs_are_held() {
        let mut bot = Bot::new(3);
        let first = bot.next_input();
        for _ in 1..MIN_HOLD_TICKS {
            assert_eq!(bot.next_input(), first);
        }
    }

    #[test]
    fn test_never_sets_unknown_bits() {
        let mut bot = Bot::new(5);
        for _ in 0..1_000 {
            assert_eq!(bot.next_input().bits() & !PlayerInput::all().bits(), 0);
        }
    }
}
