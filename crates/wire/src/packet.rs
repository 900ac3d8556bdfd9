//! Datagram framing and the fixed-width realtime codec.
//!
//! Layout of every datagram:
//!
//! ```text
//! [protocol_version: u8][packet_type: u8][body...]
//! ```
//!
//! Realtime bodies (all integers little-endian):
//!
//! ```text
//! INPUT           player_number: u8, current_frame: u32, inputs: [u8; 50]
//! VALIDATE_STATE  new_validate_frame: u32, physics_states: [u16; MAX_PLAYER_NMB]
//! ```
//!
//! Control bodies are Protobuf messages filling the rest of the datagram.

use asteroid_sim::{Frame, INVALID_PLAYER, MAX_PLAYER_NMB, PhysicsState, PlayerInput, PlayerNumber};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use thiserror::Error;

use crate::{
    JoinAckPacket, JoinPacket, MAX_INPUT_NMB, PROTOCOL_VERSION, SpawnPlayerPacket,
    StartGamePacket, WinGamePacket,
};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum WireError {
    #[error("datagram shorter than the packet header")]
    MissingHeader,

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),

    #[error("truncated {packet:?} body: expected {expected} bytes, got {actual}")]
    Truncated {
        packet: PacketType,
        expected: usize,
        actual: usize,
    },

    #[error("{0} trailing bytes after {1:?} body")]
    TrailingBytes(usize, PacketType),

    #[error("malformed protobuf body: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("player number {0} out of range")]
    InvalidPlayerNumber(u32),
}

// ============================================================================
// Packet Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Join = 0,
    SpawnPlayer = 1,
    Input = 2,
    ValidateState = 3,
    StartGame = 4,
    JoinAck = 5,
    WinGame = 6,
}

impl TryFrom<u8> for PacketType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Join,
            1 => Self::SpawnPlayer,
            2 => Self::Input,
            3 => Self::ValidateState,
            4 => Self::StartGame,
            5 => Self::JoinAck,
            6 => Self::WinGame,
            other => return Err(WireError::UnknownPacketType(other)),
        })
    }
}

/// Which channel a packet travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    Reliable,
    Unreliable,
}

/// Transport seen by the game logic.
pub trait PacketSender {
    fn send_reliable_packet(&mut self, packet: Packet);
    fn send_unreliable_packet(&mut self, packet: Packet);
}

/// Records packets in send order.
impl PacketSender for Vec<(Delivery, Packet)> {
    fn send_reliable_packet(&mut self, packet: Packet) {
        self.push((Delivery::Reliable, packet));
    }

    fn send_unreliable_packet(&mut self, packet: Packet) {
        self.push((Delivery::Unreliable, packet));
    }
}

// ============================================================================
// Realtime Packets
// ============================================================================

/// A player's inputs for `current_frame` and the frames before it.
///
/// `inputs[i]` is the input for `current_frame - i`. Consecutive packets
/// overlap, so one lost datagram does not lose any input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerInputPacket {
    pub player_number: PlayerNumber,
    pub current_frame: Frame,
    pub inputs: [PlayerInput; MAX_INPUT_NMB],
}

impl PlayerInputPacket {
    pub const ENCODED_LEN: usize = 1 + 4 + MAX_INPUT_NMB;

    /// Collect inputs for `current_frame` going backward, stopping at
    /// frame 0. Slots past frame 0 stay empty.
    pub fn new(
        player_number: PlayerNumber,
        current_frame: Frame,
        mut input_at: impl FnMut(Frame) -> PlayerInput,
    ) -> Self {
        let mut inputs = [PlayerInput::empty(); MAX_INPUT_NMB];
        for (back, slot) in inputs.iter_mut().enumerate() {
            let Some(frame) = current_frame.checked_sub(back as Frame) else {
                break;
            };
            *slot = input_at(frame);
        }
        Self {
            player_number,
            current_frame,
            inputs,
        }
    }

    /// `(frame, input)` pairs, newest first, ending at frame 0.
    pub fn frames(&self) -> impl Iterator<Item = (Frame, PlayerInput)> + '_ {
        self.inputs.iter().enumerate().map_while(|(back, &input)| {
            self.current_frame
                .checked_sub(back as Frame)
                .map(|frame| (frame, input))
        })
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_u8(self.player_number);
        buf.put_u32_le(self.current_frame);
        for input in &self.inputs {
            buf.put_u8(input.bits());
        }
    }

    fn decode_body(mut body: &[u8]) -> Result<Self, WireError> {
        check_len(PacketType::Input, body, Self::ENCODED_LEN)?;
        let player_number = body.get_u8();
        if usize::from(player_number) >= MAX_PLAYER_NMB {
            return Err(WireError::InvalidPlayerNumber(u32::from(player_number)));
        }
        let current_frame = body.get_u32_le();
        let mut inputs = [PlayerInput::empty(); MAX_INPUT_NMB];
        for input in &mut inputs {
            *input = PlayerInput::from_bits_retain(body.get_u8());
        }
        Ok(Self {
            player_number,
            current_frame,
            inputs,
        })
    }
}

/// Server confirmation of a validated frame with each player's checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidateFramePacket {
    pub new_validate_frame: Frame,
    pub physics_states: [PhysicsState; MAX_PLAYER_NMB],
}

impl ValidateFramePacket {
    pub const ENCODED_LEN: usize = 4 + 2 * MAX_PLAYER_NMB;

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.new_validate_frame);
        for state in &self.physics_states {
            buf.put_u16_le(*state);
        }
    }

    fn decode_body(mut body: &[u8]) -> Result<Self, WireError> {
        check_len(PacketType::ValidateState, body, Self::ENCODED_LEN)?;
        let new_validate_frame = body.get_u32_le();
        let mut physics_states = [0; MAX_PLAYER_NMB];
        for state in &mut physics_states {
            *state = body.get_u16_le();
        }
        Ok(Self {
            new_validate_frame,
            physics_states,
        })
    }
}

fn check_len(packet: PacketType, body: &[u8], expected: usize) -> Result<(), WireError> {
    match body.len() {
        actual if actual < expected => Err(WireError::Truncated {
            packet,
            expected,
            actual,
        }),
        actual if actual > expected => Err(WireError::TrailingBytes(actual - expected, packet)),
        _ => Ok(()),
    }
}

fn check_player_number(player_number: u32) -> Result<(), WireError> {
    if (player_number as usize) < MAX_PLAYER_NMB {
        Ok(())
    } else {
        Err(WireError::InvalidPlayerNumber(player_number))
    }
}

// ============================================================================
// Packet
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Join(JoinPacket),
    SpawnPlayer(SpawnPlayerPacket),
    Input(PlayerInputPacket),
    ValidateState(ValidateFramePacket),
    StartGame(StartGamePacket),
    JoinAck(JoinAckPacket),
    WinGame(WinGamePacket),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Join(_) => PacketType::Join,
            Self::SpawnPlayer(_) => PacketType::SpawnPlayer,
            Self::Input(_) => PacketType::Input,
            Self::ValidateState(_) => PacketType::ValidateState,
            Self::StartGame(_) => PacketType::StartGame,
            Self::JoinAck(_) => PacketType::JoinAck,
            Self::WinGame(_) => PacketType::WinGame,
        }
    }

    /// Frame the packet as one datagram.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + PlayerInputPacket::ENCODED_LEN);
        buf.put_u8(PROTOCOL_VERSION);
        buf.put_u8(self.packet_type() as u8);
        match self {
            Self::Input(packet) => packet.encode_body(&mut buf),
            Self::ValidateState(packet) => packet.encode_body(&mut buf),
            Self::Join(msg) => buf.put_slice(&msg.encode_to_vec()),
            Self::SpawnPlayer(msg) => buf.put_slice(&msg.encode_to_vec()),
            Self::StartGame(msg) => buf.put_slice(&msg.encode_to_vec()),
            Self::JoinAck(msg) => buf.put_slice(&msg.encode_to_vec()),
            Self::WinGame(msg) => buf.put_slice(&msg.encode_to_vec()),
        }
        buf.freeze()
    }

    pub fn decode(mut datagram: &[u8]) -> Result<Self, WireError> {
        if datagram.len() < 2 {
            return Err(WireError::MissingHeader);
        }
        let version = datagram.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }
        let packet_type = PacketType::try_from(datagram.get_u8())?;
        let body = datagram;

        Ok(match packet_type {
            PacketType::Input => Self::Input(PlayerInputPacket::decode_body(body)?),
            PacketType::ValidateState => {
                Self::ValidateState(ValidateFramePacket::decode_body(body)?)
            }
            PacketType::Join => Self::Join(JoinPacket::decode(body)?),
            PacketType::SpawnPlayer => {
                let msg = SpawnPlayerPacket::decode(body)?;
                check_player_number(msg.player_number)?;
                Self::SpawnPlayer(msg)
            }
            PacketType::StartGame => Self::StartGame(StartGamePacket::decode(body)?),
            PacketType::JoinAck => {
                let msg = JoinAckPacket::decode(body)?;
                check_player_number(msg.player_number)?;
                Self::JoinAck(msg)
            }
            PacketType::WinGame => {
                let msg = WinGamePacket::decode(body)?;
                if msg.winner != u32::from(INVALID_PLAYER) {
                    check_player_number(msg.winner)?;
                }
                Self::WinGame(msg)
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
