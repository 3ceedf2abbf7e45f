//! Game frame codec
//!
//! Post-login traffic is a stream of frames: a ciphered opcode byte, an
//! optional length prefix, then the body. The length of the body is fixed by
//! a 256-entry table keyed on the clear opcode; entries of -1 and -2 mark a
//! byte-sized and a little-endian short-sized length prefix respectively.
//!
//! Both directions consume exactly one keystream word per frame header.

use bytes::{Buf, BufMut, BytesMut};

use crate::crypto::Isaac;
use crate::error::{ProtocolError, Result};
use crate::net::buffer::PacketBuffer;
use crate::protocol::message::{GameMessage, VAR_BYTE, VAR_SHORT};
use crate::protocol::{MessageDecoder, MessageEncoder};

/// Body lengths of server-to-client frames, keyed by clear opcode.
///
/// -1 = byte length prefix, -2 = short length prefix, >= 0 = fixed.
pub const PACKET_LENGTHS: [i32; 256] = [
    0, 0, 0, 1, -1, 0, 0, 0, 0, 0, // 0
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 10
    0, 0, 0, 0, 1, 1, 0, 0, 0, 0, // 20
    0, 0, 0, 0, -2, 4, 3, 0, 2, 0, // 30
    0, 0, 0, 0, 5, 8, 0, 6, 0, 0, // 40
    9, 0, 0, -2, 0, 0, 0, 0, 0, 0, // 50
    -2, 1, 0, 0, 2, -2, 0, 0, 0, 0, // 60
    6, 3, 2, 4, 2, 4, 0, 0, 0, 4, // 70
    1, -2, 0, 0, 0, 0, 3, 2, 0, 0, // 80
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 90
    0, 1, 0, 0, 1, 2, 0, 0, 0, 0, // 100
    1, 0, 0, 0, 0, 2, 0, 0, 0, 0, // 110
    1, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 120
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 130
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 140
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 150
    0, 0, 0, 0, -2, -2, 0, 0, 0, 0, // 160
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 170
    0, 8, 0, 3, 0, 2, 0, 0, 8, 1, // 180
    0, 0, 12, 0, 0, 0, 0, 0, 0, 0, // 190
    2, 0, 0, 0, 0, 0, 0, 0, 4, 0, // 200
    4, 0, 0, 0, 7, 8, 0, 0, 10, 0, // 210
    0, 0, 0, 0, 0, 0, -2, 0, 0, 0, // 220
    1, 0, 0, 0, 0, 0, 0, 0, 1, 0, // 230
    2, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 240
    0, 0, 0, -1, 6, 0, // 250
];

/// No frame header currently in flight
const NO_OPCODE: i32 = -1;

/// Per-connection inbound parser state
#[derive(Debug, Clone)]
pub struct DecodeState {
    /// Clear opcode of the frame being assembled, or [`NO_OPCODE`]
    opcode: i32,
    /// Resolved body length of the frame being assembled
    length: i32,
}

impl DecodeState {
    pub fn new() -> Self {
        Self {
            opcode: NO_OPCODE,
            length: 0,
        }
    }

    fn reset(&mut self) {
        self.opcode = NO_OPCODE;
        self.length = 0;
    }
}

impl Default for DecodeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Outbound frame cipher for revision 317
#[derive(Debug, Default)]
pub struct MessageEncoder317;

impl MessageEncoder for MessageEncoder317 {
    fn encode(
        &self,
        message: &GameMessage,
        encryptor: &mut Isaac,
        out: &mut BytesMut,
    ) -> Result<()> {
        let key = encryptor.next_key();
        let frame = message.payload().as_bytes();

        match frame.split_first() {
            Some((opcode, rest)) => {
                out.put_u8(opcode.wrapping_add(key as u8));
                out.extend_from_slice(rest);
            }
            // Headerless frame: the opcode field is all there is
            None => out.put_u8(message.opcode().wrapping_add(key as u8)),
        }
        Ok(())
    }
}

/// Inbound frame reassembler for revision 317
#[derive(Debug, Default)]
pub struct MessageDecoder317;

impl MessageDecoder for MessageDecoder317 {
    fn decode(
        &self,
        state: &mut DecodeState,
        decryptor: &mut Isaac,
        input: &mut BytesMut,
        out: &mut Vec<GameMessage>,
    ) -> Result<()> {
        loop {
            if state.opcode == NO_OPCODE {
                if input.is_empty() {
                    return Ok(());
                }
                let masked = input.get_u8();
                let opcode = masked.wrapping_sub(decryptor.next_key() as u8);
                state.opcode = opcode as i32;
                state.length = PACKET_LENGTHS[opcode as usize];
                if state.length < VAR_SHORT {
                    return Err(ProtocolError::UnknownOpcodeLength(opcode).into());
                }
            }

            if state.length == VAR_BYTE {
                if input.is_empty() {
                    return Ok(());
                }
                state.length = input.get_u8() as i32;
            } else if state.length == VAR_SHORT {
                if input.len() < 2 {
                    return Ok(());
                }
                // Little-endian on the wire; masked to the full short range
                state.length = (input.get_u16_le() & 0xFFFF) as i32;
            }

            let length = state.length as usize;
            if input.len() < length {
                return Ok(());
            }

            let body = input.split_to(length);
            out.push(GameMessage::new(
                state.opcode as u8,
                length as i32,
                PacketBuffer::from_bytes(&body),
            ));
            state.reset();
        }
    }
}
