//! Typed outbound message builders
//!
//! The common client-to-server packets a bot actually sends, each producing
//! a ready-to-queue [`GameMessage`] through the buffer's framing helpers.
//! Anything not covered here can be framed by hand with [`PacketBuffer`].

use crate::error::Result;
use crate::net::buffer::{ByteOrder, ByteTransform, PacketBuffer};
use crate::protocol::message::{GameMessage, VAR_BYTE, VAR_SHORT};

/// An outbound packet type with a known opcode and size class
pub trait OutboundMessage {
    /// The packet opcode
    const OPCODE: u8;

    /// Fixed body length, or [`VAR_BYTE`] / [`VAR_SHORT`]
    const SIZE: i32;

    /// Write the packet body (everything after opcode and length prefix)
    fn body(&self, frame: &mut PacketBuffer) -> Result<()>;

    /// Frame the packet into a queueable message
    fn into_message(&self) -> Result<GameMessage> {
        let mut frame = PacketBuffer::with_capacity(32);
        match Self::SIZE {
            VAR_BYTE => {
                frame.var_message(Self::OPCODE);
                self.body(&mut frame)?;
                frame.end_var_message()?;
                Ok(GameMessage::var_byte(Self::OPCODE, frame))
            }
            VAR_SHORT => {
                frame.var_short_message(Self::OPCODE);
                self.body(&mut frame)?;
                frame.end_var_short_message()?;
                Ok(GameMessage::var_short(Self::OPCODE, frame))
            }
            _ => {
                frame.message(Self::OPCODE);
                self.body(&mut frame)?;
                Ok(GameMessage::fixed(Self::OPCODE, frame))
            }
        }
    }
}

/// Idle keepalive, sent periodically so the server keeps the session
#[derive(Debug, Clone, Copy, Default)]
pub struct IdlePacket;

impl OutboundMessage for IdlePacket {
    const OPCODE: u8 = 0;
    const SIZE: i32 = 0;

    fn body(&self, _frame: &mut PacketBuffer) -> Result<()> {
        Ok(())
    }
}

/// Public chat message
#[derive(Debug, Clone)]
pub struct ChatPacket {
    pub effects: u8,
    pub color: u8,
    pub text: String,
}

impl ChatPacket {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            effects: 0,
            color: 0,
            text: text.into(),
        }
    }
}

impl OutboundMessage for ChatPacket {
    const OPCODE: u8 = 4;
    const SIZE: i32 = VAR_BYTE;

    fn body(&self, frame: &mut PacketBuffer) -> Result<()> {
        frame.put8(self.effects, ByteTransform::Subtract);
        frame.put8(self.color, ByteTransform::Subtract);
        frame.write_bytes(self.text.as_bytes());
        Ok(())
    }
}

/// Walk request to a world tile
#[derive(Debug, Clone, Copy)]
pub struct WalkPacket {
    pub x: u16,
    pub y: u16,
    pub running: bool,
}

impl OutboundMessage for WalkPacket {
    const OPCODE: u8 = 164;
    const SIZE: i32 = VAR_BYTE;

    fn body(&self, frame: &mut PacketBuffer) -> Result<()> {
        frame.put16(self.x, ByteTransform::Add, ByteOrder::Little)?;
        frame.put16(self.y, ByteTransform::Normal, ByteOrder::Little)?;
        frame.put8(self.running as u8, ByteTransform::Negate);
        Ok(())
    }
}

/// Interface button click
#[derive(Debug, Clone, Copy)]
pub struct ButtonClickPacket {
    pub button: u16,
}

impl OutboundMessage for ButtonClickPacket {
    const OPCODE: u8 = 185;
    const SIZE: i32 = 2;

    fn body(&self, frame: &mut PacketBuffer) -> Result<()> {
        frame.write_ushort(self.button);
        Ok(())
    }
}

/// Player-typed `::command`
#[derive(Debug, Clone)]
pub struct CommandPacket {
    pub command: String,
}

impl OutboundMessage for CommandPacket {
    const OPCODE: u8 = 103;
    const SIZE: i32 = VAR_BYTE;

    fn body(&self, frame: &mut PacketBuffer) -> Result<()> {
        frame.put_string(&self.command);
        Ok(())
    }
}
