//! Login handshake codec
//!
//! The 317 login is a three-step exchange driven from the reactor's read
//! path while the connection is still pre-session:
//!
//! 1. Client sends the login opcode and the top bits of the name hash.
//! 2. Server answers with a status byte and an 8-byte session seed; the
//!    client responds with its client-info block, whose tail is an
//!    RSA-encrypted secure block carrying the ISAAC seeds and credentials.
//! 3. Server acknowledges; the session is established and both keystreams
//!    are live.
//!
//! Each step waits (leaving the read buffer untouched) until the full
//! response is buffered, so partial reads simply resume on the next wake-up.

use bytes::{Buf, BytesMut};
use rand::Rng;
use tracing::debug;

use crate::crypto::{Isaac, RsaPublicKey, DECRYPTOR_SEED_OFFSET};
use crate::error::{LoginError, LoginResponse, Result};
use crate::net::buffer::PacketBuffer;
use crate::protocol::{LoginCodec, REVISION};

/// Opcode opening the login exchange
const LOGIN_REQUEST_OPCODE: u8 = 14;

/// Login type byte for a fresh (non-reconnect) session
const LOGIN_TYPE_NEW_SESSION: u8 = 16;

/// Marker byte preceding the revision in the client-info block
const CLIENT_VARIANT_MARKER: u8 = 0xFF;

/// Magic byte opening the secure block
const SECURE_BLOCK_MAGIC: u8 = 10;

/// Client UID placeholder sent inside the secure block
const CLIENT_UID: i32 = 0x6F2CD;

/// Fixed client-info bytes between the size byte and the secure block:
/// variant marker, revision short, low-memory flag, nine CRC words.
const CLIENT_INFO_FIXED_LEN: usize = 1 + 2 + 1 + 9 * 4;

/// Stage-1 response: 8 filler bytes, a status byte, the 8-byte seed
const INITIAL_RESPONSE_LEN: usize = 17;

/// Stage-2 response: a status byte and two ignored flag bytes
const FINAL_RESPONSE_LEN: usize = 3;

/// Credentials a bot logs in with
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Product of a completed stage-2 exchange
#[derive(Debug)]
pub struct LoginHandshake {
    /// Client-info frame to write straight to the socket
    pub frame: PacketBuffer,
    /// Keystream masking outbound opcodes
    pub encryptor: Isaac,
    /// Keystream unmasking inbound opcodes
    pub decryptor: Isaac,
}

/// Pack a username into its 6-bit-per-character numeric form.
///
/// Letters map to 1..=26, digits to 27..=36, anything else to 0; case is
/// folded. At most twelve characters contribute.
pub fn encode_base37(username: &str) -> u64 {
    let mut hash = 0u64;
    for c in username.chars().take(12) {
        let value = match c.to_ascii_lowercase() {
            c @ 'a'..='z' => c as u64 - 'a' as u64 + 1,
            c @ '0'..='9' => c as u64 - '0' as u64 + 27,
            _ => 0,
        };
        hash = (hash << 6) | value;
    }
    hash
}

/// Recover a username from its packed form (lossy for folded characters)
pub fn decode_base37(mut hash: u64) -> String {
    let mut chars = Vec::new();
    while hash != 0 {
        let value = (hash & 0x3F) as u8;
        hash >>= 6;
        let c = match value {
            1..=26 => (value - 1 + b'a') as char,
            27..=36 => (value - 27 + b'0') as char,
            _ => '_',
        };
        chars.push(c);
    }
    chars.reverse();
    chars.into_iter().collect()
}

/// Login handshake strategy for revision 317
#[derive(Debug, Default)]
pub struct LoginCodec317;

impl LoginCodec for LoginCodec317 {
    fn initial_request(&self, username: &str) -> PacketBuffer {
        let name_hash = ((encode_base37(username) >> 16) & 0x1F) as u8;
        let mut frame = PacketBuffer::with_capacity(2);
        frame.write_ubyte(LOGIN_REQUEST_OPCODE);
        frame.write_ubyte(name_hash);
        frame
    }

    fn initial_response(
        &self,
        credentials: &Credentials,
        rsa: Option<&RsaPublicKey>,
        input: &mut BytesMut,
    ) -> Result<Option<LoginHandshake>> {
        if input.len() < INITIAL_RESPONSE_LEN {
            return Ok(None);
        }

        let mut header = PacketBuffer::from_bytes(&input[..INITIAL_RESPONSE_LEN]);
        header.skip(8);
        let status = header.read_ubyte()?;
        if status != 0 {
            return Err(LoginError::Rejected {
                stage: "initial response",
                response: LoginResponse::from_u8(status),
            }
            .into());
        }
        let server_seed_high = header.read_int()? as u32;
        let server_seed_low = header.read_int()? as u32;
        input.advance(INITIAL_RESPONSE_LEN);

        let mut rng = rand::thread_rng();
        let seeds = [
            rng.gen::<u32>(),
            rng.gen::<u32>(),
            server_seed_high,
            server_seed_low,
        ];

        let mut secure = PacketBuffer::with_capacity(64);
        secure.write_ubyte(SECURE_BLOCK_MAGIC);
        for seed in seeds {
            secure.write_int(seed as i32);
        }
        secure.write_int(CLIENT_UID);
        secure.put_string(&credentials.username);
        secure.put_string(&credentials.password);
        secure.encode_rsa(rsa)?;

        let mut frame = PacketBuffer::with_capacity(secure.len() + CLIENT_INFO_FIXED_LEN + 2);
        frame.write_ubyte(LOGIN_TYPE_NEW_SESSION);
        frame.write_ubyte((secure.write_position() + CLIENT_INFO_FIXED_LEN) as u8);
        frame.write_ubyte(CLIENT_VARIANT_MARKER);
        frame.write_ushort(REVISION);
        frame.write_ubyte(0);
        for _ in 0..9 {
            frame.write_int(rng.gen::<i32>());
        }
        frame.write_bytes(secure.as_bytes());

        debug!(
            username = %credentials.username,
            block_len = frame.len(),
            rsa = rsa.is_some(),
            "Built client-info block"
        );

        Ok(Some(LoginHandshake {
            frame,
            encryptor: Isaac::new(&seeds),
            decryptor: Isaac::with_seed_offset(&seeds, DECRYPTOR_SEED_OFFSET),
        }))
    }

    fn final_response(&self, input: &mut BytesMut) -> Result<bool> {
        if input.len() < FINAL_RESPONSE_LEN {
            return Ok(false);
        }

        let status = input[0];
        if status != LoginResponse::Success.as_u8() {
            return Err(LoginError::Rejected {
                stage: "final response",
                response: LoginResponse::from_u8(status),
            }
            .into());
        }
        // Rights and flagged bytes are irrelevant to a bot
        input.advance(FINAL_RESPONSE_LEN);
        Ok(true)
    }
}
