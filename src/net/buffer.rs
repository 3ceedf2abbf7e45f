//! Packet buffer implementation
//!
//! Provides a byte buffer with the 317 protocol read/write operations:
//! - Standard integer widths (byte, short, int, long)
//! - Four byte orders, including the two 32-bit-only middle orders
//! - Per-byte obfuscation transforms (A/C/S)
//! - Bit access mode for flag packing
//! - Variable-length message framing with patched length prefixes
//! - Newline-terminated string encoding
//! - In-place RSA encoding of the written bytes

use bytes::{BufMut, BytesMut};

use crate::crypto::RsaPublicKey;
use crate::error::{ProtocolError, Result};

/// Per-byte obfuscation applied to the low-order byte of a value.
///
/// The transform touches only the emitted byte that carries B0 (the least
/// significant byte of the source value); every other byte goes out as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteTransform {
    /// Identity
    Normal,
    /// Type A: `v + 128` on write, `v - 128` on read
    Add,
    /// Type C: negate both ways
    Negate,
    /// Type S: `128 - v` both ways
    Subtract,
}

impl ByteTransform {
    #[inline]
    fn apply(self, value: u8) -> u8 {
        match self {
            Self::Normal => value,
            Self::Add => value.wrapping_add(128),
            Self::Negate => (value as i8).wrapping_neg() as u8,
            Self::Subtract => 128u8.wrapping_sub(value),
        }
    }

    #[inline]
    fn revert(self, value: u8) -> u8 {
        match self {
            Self::Normal => value,
            Self::Add => value.wrapping_sub(128),
            Self::Negate => (value as i8).wrapping_neg() as u8,
            Self::Subtract => 128u8.wrapping_sub(value),
        }
    }
}

/// Byte order for multi-byte values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Most significant byte first
    Big,
    /// Least significant byte first
    Little,
    /// 32-bit only: `[B1, B0, B3, B2]`
    Middle,
    /// 32-bit only: `[B2, B3, B0, B1]`
    InverseMiddle,
}

impl ByteOrder {
    /// Emission sequence as source byte indices (0 = least significant).
    ///
    /// The middle orders exist only at 32 bits; anything else is an error.
    fn sequence(self, width: usize) -> std::result::Result<&'static [usize], ProtocolError> {
        const BIG16: [usize; 2] = [1, 0];
        const BIG32: [usize; 4] = [3, 2, 1, 0];
        const BIG64: [usize; 8] = [7, 6, 5, 4, 3, 2, 1, 0];
        const LITTLE16: [usize; 2] = [0, 1];
        const LITTLE32: [usize; 4] = [0, 1, 2, 3];
        const LITTLE64: [usize; 8] = [0, 1, 2, 3, 4, 5, 6, 7];
        const MIDDLE32: [usize; 4] = [1, 0, 3, 2];
        const INVERSE32: [usize; 4] = [2, 3, 0, 1];

        match (self, width) {
            (Self::Big, 2) => Ok(&BIG16),
            (Self::Big, 4) => Ok(&BIG32),
            (Self::Big, 8) => Ok(&BIG64),
            (Self::Little, 2) => Ok(&LITTLE16),
            (Self::Little, 4) => Ok(&LITTLE32),
            (Self::Little, 8) => Ok(&LITTLE64),
            (Self::Middle, 4) => Ok(&MIDDLE32),
            (Self::InverseMiddle, 4) => Ok(&INVERSE32),
            (Self::Middle, w) => Err(ProtocolError::UnsupportedWidth {
                order: "Middle",
                bits: (w * 8) as u32,
            }),
            (Self::InverseMiddle, w) => Err(ProtocolError::UnsupportedWidth {
                order: "InverseMiddle",
                bits: (w * 8) as u32,
            }),
            _ => unreachable!("widths are fixed by the typed entry points"),
        }
    }
}

/// Terminator byte for protocol strings
const STRING_TERMINATOR: u8 = 0x0A;

/// Bit access state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BitMode {
    Off,
    Write,
    Read,
}

/// Open variable-length frame awaiting its terminator
#[derive(Debug, Clone, Copy)]
enum VarLength {
    /// Byte-sized length prefix at this index
    Byte(usize),
    /// Short-sized length prefix at this index
    Short(usize),
}

/// Packet buffer for reading and writing game protocol data
#[derive(Debug, Clone)]
pub struct PacketBuffer {
    /// Internal byte buffer; write position is its length
    data: BytesMut,
    /// Current read position
    read_pos: usize,
    /// Bit cursor (in bits), valid only inside a bit access block
    bit_pos: usize,
    /// Which bit access block, if any, is open
    bit_mode: BitMode,
    /// Saved length-prefix index of an open variable-length message
    var_length: Option<VarLength>,
}

impl PacketBuffer {
    /// Create a new empty packet buffer
    pub fn new() -> Self {
        Self {
            data: BytesMut::new(),
            read_pos: 0,
            bit_pos: 0,
            bit_mode: BitMode::Off,
            var_length: None,
        }
    }

    /// Create a packet buffer with a specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            ..Self::new()
        }
    }

    /// Create a packet buffer from existing bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            ..Self::new()
        }
    }

    // ============ Properties ============

    /// Get the current read position
    #[inline]
    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    /// Get the current write position (end of buffer)
    #[inline]
    pub fn write_position(&self) -> usize {
        self.data.len()
    }

    /// Get the total length of the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the number of bytes remaining to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.read_pos)
    }

    /// Check if there are bytes remaining to read
    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Get a reference to the underlying bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get a mutable reference to the underlying bytes
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Clear the buffer and reset positions
    pub fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
        self.bit_pos = 0;
        self.bit_mode = BitMode::Off;
        self.var_length = None;
    }

    /// Reset read position to start
    pub fn reset(&mut self) {
        self.read_pos = 0;
        self.bit_pos = 0;
        self.bit_mode = BitMode::Off;
    }

    /// Skip a number of bytes when reading
    pub fn skip(&mut self, count: usize) {
        self.read_pos = (self.read_pos + count).min(self.data.len());
    }

    #[inline]
    fn check_remaining(&self, needed: usize) -> std::result::Result<(), ProtocolError> {
        let available = self.remaining();
        if available < needed {
            return Err(ProtocolError::BufferUnderflow { needed, available });
        }
        Ok(())
    }

    // ============ Parametric core ============

    /// Write a byte under a transform
    pub fn put8(&mut self, value: u8, transform: ByteTransform) {
        self.data.put_u8(transform.apply(value));
    }

    /// Read a byte under a transform
    pub fn get8(&mut self, transform: ByteTransform) -> Result<u8> {
        self.check_remaining(1)?;
        let value = transform.revert(self.data[self.read_pos]);
        self.read_pos += 1;
        Ok(value)
    }

    fn put_value(&mut self, value: u64, width: usize, t: ByteTransform, o: ByteOrder) -> Result<()> {
        let sequence = o.sequence(width)?;
        for &index in sequence {
            let raw = (value >> (index * 8)) as u8;
            let byte = if index == 0 { t.apply(raw) } else { raw };
            self.data.put_u8(byte);
        }
        Ok(())
    }

    fn get_value(&mut self, width: usize, t: ByteTransform, o: ByteOrder) -> Result<u64> {
        let sequence = o.sequence(width)?;
        self.check_remaining(width)?;
        let mut value = 0u64;
        for &index in sequence {
            let mut byte = self.data[self.read_pos];
            self.read_pos += 1;
            if index == 0 {
                byte = t.revert(byte);
            }
            value |= (byte as u64) << (index * 8);
        }
        Ok(value)
    }

    /// Write a 16-bit value under a transform and byte order
    pub fn put16(&mut self, value: u16, t: ByteTransform, o: ByteOrder) -> Result<()> {
        self.put_value(value as u64, 2, t, o)
    }

    /// Read a 16-bit value under a transform and byte order
    pub fn get16(&mut self, t: ByteTransform, o: ByteOrder) -> Result<u16> {
        Ok(self.get_value(2, t, o)? as u16)
    }

    /// Write a 32-bit value under a transform and byte order
    pub fn put32(&mut self, value: u32, t: ByteTransform, o: ByteOrder) -> Result<()> {
        self.put_value(value as u64, 4, t, o)
    }

    /// Read a 32-bit value under a transform and byte order
    pub fn get32(&mut self, t: ByteTransform, o: ByteOrder) -> Result<u32> {
        Ok(self.get_value(4, t, o)? as u32)
    }

    /// Write a 64-bit value under a transform and byte order
    pub fn put64(&mut self, value: u64, t: ByteTransform, o: ByteOrder) -> Result<()> {
        self.put_value(value, 8, t, o)
    }

    /// Read a 64-bit value under a transform and byte order
    pub fn get64(&mut self, t: ByteTransform, o: ByteOrder) -> Result<u64> {
        self.get_value(8, t, o)
    }

    // ============ Convenience wrappers ============

    /// Write an unsigned byte
    #[inline]
    pub fn write_ubyte(&mut self, value: u8) {
        self.data.put_u8(value);
    }

    /// Read an unsigned byte
    #[inline]
    pub fn read_ubyte(&mut self) -> Result<u8> {
        self.get8(ByteTransform::Normal)
    }

    /// Write an unsigned big-endian short
    pub fn write_ushort(&mut self, value: u16) {
        self.data.put_u16(value);
    }

    /// Read an unsigned big-endian short
    pub fn read_ushort(&mut self) -> Result<u16> {
        self.get16(ByteTransform::Normal, ByteOrder::Big)
    }

    /// Read an unsigned little-endian short
    pub fn read_ushort_le(&mut self) -> Result<u16> {
        self.get16(ByteTransform::Normal, ByteOrder::Little)
    }

    /// Write a signed big-endian int
    pub fn write_int(&mut self, value: i32) {
        self.data.put_i32(value);
    }

    /// Read a signed big-endian int
    pub fn read_int(&mut self) -> Result<i32> {
        Ok(self.get32(ByteTransform::Normal, ByteOrder::Big)? as i32)
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Read a specific number of bytes
    pub fn read_bytes(&mut self, length: usize) -> Result<Vec<u8>> {
        self.check_remaining(length)?;
        let bytes = self.data[self.read_pos..self.read_pos + length].to_vec();
        self.read_pos += length;
        Ok(bytes)
    }

    // ============ Strings ============

    /// Write a newline-terminated protocol string
    pub fn put_string(&mut self, value: &str) {
        self.data.extend_from_slice(value.as_bytes());
        self.data.put_u8(STRING_TERMINATOR);
    }

    /// Read a newline-terminated protocol string, terminator excluded
    pub fn get_string(&mut self) -> Result<String> {
        let slice = &self.data[self.read_pos..];
        let end = slice
            .iter()
            .position(|&b| b == STRING_TERMINATOR)
            .ok_or(ProtocolError::BufferUnderflow {
                needed: slice.len() + 1,
                available: slice.len(),
            })?;
        let value = String::from_utf8_lossy(&slice[..end]).into_owned();
        self.read_pos += end + 1;
        Ok(value)
    }

    // ============ Message framing ============

    /// Begin a fixed-length message: write the opcode byte
    pub fn message(&mut self, opcode: u8) {
        self.data.put_u8(opcode);
    }

    /// Begin a variable-length message with a byte-sized length prefix
    pub fn var_message(&mut self, opcode: u8) {
        self.data.put_u8(opcode);
        self.var_length = Some(VarLength::Byte(self.data.len()));
        self.data.put_u8(0);
    }

    /// Patch the byte-sized length prefix of the open message
    pub fn end_var_message(&mut self) -> Result<()> {
        match self.var_length.take() {
            Some(VarLength::Byte(index)) => {
                let written = self.data.len() - index - 1;
                if written > u8::MAX as usize {
                    return Err(ProtocolError::VarLengthOverflow(written).into());
                }
                self.data[index] = written as u8;
                Ok(())
            }
            _ => Err(ProtocolError::VarLengthMissing.into()),
        }
    }

    /// Begin a variable-length message with a short-sized length prefix
    pub fn var_short_message(&mut self, opcode: u8) {
        self.data.put_u8(opcode);
        self.var_length = Some(VarLength::Short(self.data.len()));
        self.data.put_u16(0);
    }

    /// Patch the short-sized length prefix of the open message (big-endian)
    pub fn end_var_short_message(&mut self) -> Result<()> {
        match self.var_length.take() {
            Some(VarLength::Short(index)) => {
                let written = self.data.len() - index - 2;
                if written > u16::MAX as usize {
                    return Err(ProtocolError::VarLengthOverflow(written).into());
                }
                self.data[index] = (written >> 8) as u8;
                self.data[index + 1] = written as u8;
                Ok(())
            }
            _ => Err(ProtocolError::VarLengthMissing.into()),
        }
    }

    // ============ Bit access ============

    /// Enter bit access mode for writing, starting at the write position
    pub fn start_bit_access(&mut self) {
        self.bit_pos = self.data.len() * 8;
        self.bit_mode = BitMode::Write;
    }

    /// Enter bit access mode for reading, starting at the read position
    pub fn start_bit_read(&mut self) {
        self.bit_pos = self.read_pos * 8;
        self.bit_mode = BitMode::Read;
    }

    /// Exit bit access mode, rounding the affected position up to a byte
    pub fn end_bit_access(&mut self) {
        let byte_pos = (self.bit_pos + 7) / 8;
        match self.bit_mode {
            BitMode::Write => {
                if self.data.len() < byte_pos {
                    self.data.resize(byte_pos, 0);
                }
            }
            BitMode::Read => self.read_pos = byte_pos.min(self.data.len()),
            BitMode::Off => {}
        }
        self.bit_mode = BitMode::Off;
    }

    /// Write the low `count` bits of `value`, MSB first, growing as needed
    pub fn put_bits(&mut self, count: u32, value: u32) -> Result<()> {
        if self.bit_mode != BitMode::Write {
            return Err(ProtocolError::BitAccessMisuse.into());
        }
        if !(1..=32).contains(&count) {
            return Err(ProtocolError::BitCountOutOfRange(count).into());
        }

        let mut byte_pos = self.bit_pos >> 3;
        let mut bit_offset = 8 - (self.bit_pos & 7);
        let mut remaining = count as usize;

        self.bit_pos += remaining;
        let needed = (self.bit_pos + 7) / 8;
        if self.data.len() < needed {
            self.data.resize(needed, 0);
        }

        while remaining > bit_offset {
            let mask = (1u32 << bit_offset) - 1;
            self.data[byte_pos] &= !(mask as u8);
            self.data[byte_pos] |= ((value >> (remaining - bit_offset)) & mask) as u8;
            remaining -= bit_offset;
            byte_pos += 1;
            bit_offset = 8;
        }

        if remaining == bit_offset {
            let mask = (1u32 << bit_offset) - 1;
            self.data[byte_pos] &= !(mask as u8);
            self.data[byte_pos] |= (value & mask) as u8;
        } else {
            let mask = ((1u32 << remaining) - 1) << (bit_offset - remaining);
            self.data[byte_pos] &= !(mask as u8);
            self.data[byte_pos] |= ((value & ((1u32 << remaining) - 1)) << (bit_offset - remaining)) as u8;
        }

        Ok(())
    }

    /// Write a single flag bit
    pub fn put_bit(&mut self, flag: bool) -> Result<()> {
        self.put_bits(1, flag as u32)
    }

    /// Read `count` bits, MSB first
    pub fn get_bits(&mut self, count: u32) -> Result<u32> {
        if self.bit_mode != BitMode::Read {
            return Err(ProtocolError::BitAccessMisuse.into());
        }
        if !(1..=32).contains(&count) {
            return Err(ProtocolError::BitCountOutOfRange(count).into());
        }

        let needed = (self.bit_pos + count as usize + 7) / 8;
        if needed > self.data.len() {
            return Err(ProtocolError::BufferUnderflow {
                needed,
                available: self.data.len(),
            }
            .into());
        }

        let mut byte_pos = self.bit_pos >> 3;
        let mut bit_offset = 8 - (self.bit_pos & 7);
        let mut remaining = count as usize;
        let mut value = 0u32;

        self.bit_pos += remaining;

        while remaining > bit_offset {
            let chunk = (self.data[byte_pos] as u32) & ((1u32 << bit_offset) - 1);
            value |= chunk << (remaining - bit_offset);
            remaining -= bit_offset;
            byte_pos += 1;
            bit_offset = 8;
        }

        if remaining == bit_offset {
            value |= (self.data[byte_pos] as u32) & ((1u32 << bit_offset) - 1);
        } else {
            value |= ((self.data[byte_pos] as u32) >> (bit_offset - remaining))
                & ((1u32 << remaining) - 1);
        }

        Ok(value)
    }

    // ============ RSA ============

    /// Replace the written bytes with their RSA encoding, length-prefixed.
    ///
    /// The bytes in `[0, write_position)` are interpreted as a big-endian
    /// integer and raised to the public exponent modulo the key. Without a
    /// key the bytes pass through untouched, still length-prefixed.
    pub fn encode_rsa(&mut self, key: Option<&RsaPublicKey>) -> Result<()> {
        let encoded = match key {
            Some(key) => key.encrypt(&self.data)?,
            None => self.data.to_vec(),
        };
        self.data.clear();
        self.data.put_u8(encoded.len() as u8);
        self.data.extend_from_slice(&encoded);
        Ok(())
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<u8>> for PacketBuffer {
    fn from(vec: Vec<u8>) -> Self {
        Self::from_bytes(&vec)
    }
}

impl From<&[u8]> for PacketBuffer {
    fn from(slice: &[u8]) -> Self {
        Self::from_bytes(slice)
    }
}

impl AsRef<[u8]> for PacketBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TRANSFORMS: [ByteTransform; 4] = [
        ByteTransform::Normal,
        ByteTransform::Add,
        ByteTransform::Negate,
        ByteTransform::Subtract,
    ];

    #[test]
    fn test_byte_roundtrip_all_transforms() {
        for t in TRANSFORMS {
            let mut buf = PacketBuffer::new();
            for v in [0u8, 1, 127, 128, 200, 255] {
                buf.put8(v, t);
            }
            buf.reset();
            for v in [0u8, 1, 127, 128, 200, 255] {
                assert_eq!(buf.get8(t).unwrap(), v, "transform {:?}", t);
            }
        }
    }

    #[test]
    fn test_wide_roundtrip_all_transforms_and_orders() {
        let wide_orders = [ByteOrder::Big, ByteOrder::Little];
        let int_orders = [
            ByteOrder::Big,
            ByteOrder::Little,
            ByteOrder::Middle,
            ByteOrder::InverseMiddle,
        ];

        for t in TRANSFORMS {
            for o in wide_orders {
                let mut buf = PacketBuffer::new();
                buf.put16(0xBEEF, t, o).unwrap();
                buf.put64(0x0123_4567_89AB_CDEF, t, o).unwrap();
                buf.reset();
                assert_eq!(buf.get16(t, o).unwrap(), 0xBEEF);
                assert_eq!(buf.get64(t, o).unwrap(), 0x0123_4567_89AB_CDEF);
            }
            for o in int_orders {
                let mut buf = PacketBuffer::new();
                buf.put32(0xDEAD_BEEF, t, o).unwrap();
                buf.reset();
                assert_eq!(buf.get32(t, o).unwrap(), 0xDEAD_BEEF, "{:?}/{:?}", t, o);
            }
        }
    }

    #[test]
    fn test_middle_orders_fail_on_other_widths() {
        let mut buf = PacketBuffer::new();
        assert!(buf
            .put16(1, ByteTransform::Normal, ByteOrder::Middle)
            .is_err());
        assert!(buf
            .put64(1, ByteTransform::Normal, ByteOrder::InverseMiddle)
            .is_err());
        assert!(buf
            .put16(1, ByteTransform::Normal, ByteOrder::InverseMiddle)
            .is_err());
        assert!(buf.put64(1, ByteTransform::Normal, ByteOrder::Middle).is_err());
        // No partial writes when the order is rejected
        assert!(buf.is_empty());
    }

    #[test]
    fn test_middle_wire_layout() {
        let mut buf = PacketBuffer::new();
        buf.put32(0x0403_0201, ByteTransform::Normal, ByteOrder::Middle)
            .unwrap();
        assert_eq!(buf.as_bytes(), &[0x02, 0x01, 0x04, 0x03]);

        let mut buf = PacketBuffer::new();
        buf.put32(0x0403_0201, ByteTransform::Normal, ByteOrder::InverseMiddle)
            .unwrap();
        assert_eq!(buf.as_bytes(), &[0x03, 0x04, 0x01, 0x02]);
    }

    #[test]
    fn test_transform_touches_low_byte_only() {
        let mut buf = PacketBuffer::new();
        buf.put16(0x1234, ByteTransform::Add, ByteOrder::Big).unwrap();
        assert_eq!(buf.as_bytes(), &[0x12, 0x34 + 128]);

        let mut buf = PacketBuffer::new();
        buf.put32(0x0403_0201, ByteTransform::Add, ByteOrder::Middle)
            .unwrap();
        assert_eq!(buf.as_bytes(), &[0x02, 0x01 + 128, 0x04, 0x03]);
    }

    #[test]
    fn test_underflow_errors() {
        let mut buf = PacketBuffer::from_bytes(&[1, 2]);
        assert!(buf.read_int().is_err());
        // Failed read must not consume
        assert_eq!(buf.remaining(), 2);
        assert_eq!(buf.read_ushort().unwrap(), 0x0102);
        assert!(buf.read_ubyte().is_err());
    }

    #[test]
    fn test_string_roundtrip() {
        let mut buf = PacketBuffer::new();
        buf.put_string("hello world");
        buf.put_string("");
        buf.put_string("p4ss!");
        buf.reset();
        assert_eq!(buf.get_string().unwrap(), "hello world");
        assert_eq!(buf.get_string().unwrap(), "");
        assert_eq!(buf.get_string().unwrap(), "p4ss!");
    }

    #[test]
    fn test_string_missing_terminator() {
        let mut buf = PacketBuffer::from_bytes(b"unterminated");
        assert!(buf.get_string().is_err());
    }

    #[test]
    fn test_var_message_length_patched() {
        let mut buf = PacketBuffer::new();
        buf.var_message(53);
        buf.write_ubyte(0xAA);
        buf.write_ushort(0xBBCC);
        buf.end_var_message().unwrap();

        assert_eq!(buf.as_bytes(), &[53, 3, 0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn test_var_short_message_length_patched() {
        let mut buf = PacketBuffer::new();
        buf.var_short_message(81);
        let body = vec![0x55u8; 300];
        buf.write_bytes(&body);
        buf.end_var_short_message().unwrap();

        assert_eq!(buf.len(), 1 + 2 + 300);
        assert_eq!(buf.as_bytes()[0], 81);
        assert_eq!(buf.as_bytes()[1], (300 >> 8) as u8);
        assert_eq!(buf.as_bytes()[2], (300 & 0xFF) as u8);
    }

    #[test]
    fn test_var_terminator_without_open_message() {
        let mut buf = PacketBuffer::new();
        assert!(buf.end_var_message().is_err());
        assert!(buf.end_var_short_message().is_err());

        // Mismatched pair is also rejected
        buf.var_message(10);
        assert!(buf.end_var_short_message().is_err());
    }

    #[test]
    fn test_bit_roundtrip_all_widths() {
        for count in 1..=32u32 {
            let value = if count == 32 {
                0xA5A5_A5A5
            } else {
                (((1u32 << count) - 1) & 0x5555_5555) | 1
            };
            let mut buf = PacketBuffer::new();
            buf.start_bit_access();
            buf.put_bits(count, value).unwrap();
            buf.end_bit_access();

            buf.reset();
            buf.start_bit_read();
            assert_eq!(buf.get_bits(count).unwrap(), value, "width {}", count);
        }
    }

    #[test]
    fn test_bit_sequence() {
        let mut buf = PacketBuffer::new();
        buf.start_bit_access();
        buf.put_bit(true).unwrap();
        buf.put_bits(5, 15).unwrap();
        buf.put_bits(11, 1234).unwrap();
        buf.put_bits(30, 0x2BAD_CAFE).unwrap();
        buf.end_bit_access();

        buf.reset();
        buf.start_bit_read();
        assert_eq!(buf.get_bits(1).unwrap(), 1);
        assert_eq!(buf.get_bits(5).unwrap(), 15);
        assert_eq!(buf.get_bits(11).unwrap(), 1234);
        assert_eq!(buf.get_bits(30).unwrap(), 0x2BAD_CAFE);
    }

    #[test]
    fn test_bits_append_after_bytes() {
        let mut buf = PacketBuffer::new();
        buf.write_ubyte(0xFF);
        buf.start_bit_access();
        buf.put_bits(4, 0b1010).unwrap();
        buf.end_bit_access();

        assert_eq!(buf.len(), 2);
        assert_eq!(buf.as_bytes(), &[0xFF, 0b1010_0000]);
    }

    #[test]
    fn test_bit_access_misuse() {
        let mut buf = PacketBuffer::new();
        assert!(buf.put_bits(4, 1).is_err());
        assert!(buf.get_bits(4).is_err());

        buf.start_bit_access();
        assert!(buf.put_bits(0, 0).is_err());
        assert!(buf.put_bits(33, 0).is_err());
    }

    #[test]
    fn test_rsa_identity_without_key() {
        let mut buf = PacketBuffer::new();
        buf.write_ubyte(10);
        buf.write_int(0x01020304);
        buf.encode_rsa(None).unwrap();

        assert_eq!(buf.as_bytes(), &[5, 10, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_read_bytes() {
        let mut buf = PacketBuffer::from_bytes(&[1, 2, 3, 4, 5]);
        assert_eq!(buf.read_bytes(3).unwrap(), vec![1, 2, 3]);
        assert!(buf.read_bytes(3).is_err());
        assert_eq!(buf.read_bytes(2).unwrap(), vec![4, 5]);
    }

    #[test]
    fn test_growth_preserves_contents() {
        let mut buf = PacketBuffer::with_capacity(4);
        for i in 0..100u8 {
            buf.write_ubyte(i);
        }
        assert_eq!(buf.len(), 100);
        buf.reset();
        for i in 0..100u8 {
            assert_eq!(buf.read_ubyte().unwrap(), i);
        }
    }
}
