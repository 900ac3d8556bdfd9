//! Player input flags.

use bitflags::bitflags;

bitflags! {
    /// One frame of player intent, transmitted on the wire as a raw byte.
    ///
    /// Unknown bits are retained so that an echoed input compares equal to
    /// what the client sent.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PlayerInput: u8 {
        const UP = 1 << 0;
        const DOWN = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
        const SHOOT = 1 << 4;
    }
}

impl PlayerInput {
    /// Rotation direction: `+1` for LEFT, `-1` for RIGHT, `0` for both or neither.
    pub fn turn_axis(self) -> f32 {
        let left = if self.contains(Self::LEFT) { 1.0 } else { 0.0 };
        let right = if self.contains(Self::RIGHT) { -1.0 } else { 0.0 };
        left + right
    }

    /// Thrust direction: `+1` for UP, `-1` for DOWN, `0` for both or neither.
    pub fn thrust_axis(self) -> f32 {
        let down = if self.contains(Self::DOWN) { -1.0 } else { 0.0 };
        let up = if self.contains(Self::UP) { 1.0 } else { 0.0 };
        down + up
    }
}

impl From<u8> for PlayerInput {
    fn from(bits: u8) -> Self {
        Self::from_bits_retain(bits)
    }
}

impl From<PlayerInput> for u8 {
    fn from(input: PlayerInput) -> Self {
        input.bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axes() {
        assert_eq!((PlayerInput::LEFT | PlayerInput::RIGHT).turn_axis(), 0.0);
        assert_eq!(PlayerInput::LEFT.turn_axis(), 1.0);
        assert_eq!(PlayerInput::RIGHT.turn_axis(), -1.0);
        assert_eq!(PlayerInput::UP.thrust_axis(), 1.0);
        assert_eq!(PlayerInput::DOWN.thrust_axis(), -1.0);
        assert_eq!(PlayerInput::empty().thrust_axis(), 0.0);
    }

    #[test]
    fn test_unknown_bits_survive_byte_conversion() {
        let input = PlayerInput::from(0b1010_0001);
        assert_eq!(u8::from(input), 0b1010_0001);
        assert!(input.contains(PlayerInput::UP));
    }
}
