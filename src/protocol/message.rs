//! Game message definition
//!
//! A message is an opcode, a size classification, and a payload buffer.
//! Outbound messages carry the complete frame (opcode byte included) so the
//! encoder only has to cipher the first byte; decoded inbound messages carry
//! the body alone.

use crate::net::buffer::PacketBuffer;

/// Size marker for a variable-length message with a byte prefix
pub const VAR_BYTE: i32 = -1;

/// Size marker for a variable-length message with a short prefix
pub const VAR_SHORT: i32 = -2;

/// A single game protocol message
#[derive(Debug, Clone)]
pub struct GameMessage {
    /// Frame opcode, pre-cipher
    opcode: u8,
    /// Fixed body length, or [`VAR_BYTE`] / [`VAR_SHORT`]
    size: i32,
    /// Frame bytes (outbound) or body bytes (inbound)
    payload: PacketBuffer,
}

impl GameMessage {
    /// Create a message from its parts
    pub fn new(opcode: u8, size: i32, payload: PacketBuffer) -> Self {
        Self {
            opcode,
            size,
            payload,
        }
    }

    /// Build an outbound fixed-length message around a framed buffer
    pub fn fixed(opcode: u8, frame: PacketBuffer) -> Self {
        let size = frame.len().saturating_sub(1) as i32;
        Self::new(opcode, size, frame)
    }

    /// Build an outbound variable-byte message around a framed buffer
    pub fn var_byte(opcode: u8, frame: PacketBuffer) -> Self {
        Self::new(opcode, VAR_BYTE, frame)
    }

    /// Build an outbound variable-short message around a framed buffer
    pub fn var_short(opcode: u8, frame: PacketBuffer) -> Self {
        Self::new(opcode, VAR_SHORT, frame)
    }

    #[inline]
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    #[inline]
    pub fn size(&self) -> i32 {
        self.size
    }

    #[inline]
    pub fn payload(&self) -> &PacketBuffer {
        &self.payload
    }

    /// Consume the message, keeping only the payload
    pub fn into_payload(self) -> PacketBuffer {
        self.payload
    }
}
