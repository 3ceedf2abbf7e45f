//! 317 protocol implementation
//!
//! The wire logic is split into three strategy roles so a group can swap any
//! of them out wholesale (a different revision, an instrumented codec in
//! tests) without touching the connection machinery:
//!
//! - [`MessageEncoder`] - ciphers and serializes outbound game frames
//! - [`MessageDecoder`] - reassembles inbound game frames
//! - [`LoginCodec`] - drives the three-step login handshake
//!
//! All three are stateless with respect to connections; parser and cipher
//! state lives on the connection that owns it.

pub mod game;
pub mod login;
pub mod message;
pub mod outgoing;

use bytes::BytesMut;

use crate::crypto::{Isaac, RsaPublicKey};
use crate::error::Result;
use crate::net::buffer::PacketBuffer;

pub use game::{DecodeState, MessageDecoder317, MessageEncoder317, PACKET_LENGTHS};
pub use login::{encode_base37, Credentials, LoginCodec317, LoginHandshake};
pub use message::GameMessage;

/// Client revision implemented by the default codecs
pub const REVISION: u16 = 317;

/// Outbound game frame cipher strategy
pub trait MessageEncoder: Send + Sync {
    /// Cipher the opcode of `message` and append its wire bytes to `out`.
    ///
    /// Consumes exactly one keystream word per message.
    fn encode(&self, message: &GameMessage, encryptor: &mut Isaac, out: &mut BytesMut)
        -> Result<()>;
}

/// Inbound game frame reassembly strategy
pub trait MessageDecoder: Send + Sync {
    /// Consume as many complete frames from `input` as are available,
    /// pushing each onto `out`. Incomplete trailing bytes stay in `input`
    /// for the next read wake-up.
    fn decode(
        &self,
        state: &mut DecodeState,
        decryptor: &mut Isaac,
        input: &mut BytesMut,
        out: &mut Vec<GameMessage>,
    ) -> Result<()>;
}

/// Login handshake strategy
pub trait LoginCodec: Send + Sync {
    /// Build the stage-1 frame sent immediately after the socket connects.
    fn initial_request(&self, username: &str) -> PacketBuffer;

    /// Handle the stage-1 server response once enough bytes arrived.
    ///
    /// Returns `None` when `input` does not yet hold the full response;
    /// the unconsumed bytes must stay in `input`.
    fn initial_response(
        &self,
        credentials: &Credentials,
        rsa: Option<&RsaPublicKey>,
        input: &mut BytesMut,
    ) -> Result<Option<LoginHandshake>>;

    /// Handle the stage-2 server acknowledgement.
    ///
    /// Returns `false` while bytes are still missing, `true` once the
    /// session is established.
    fn final_response(&self, input: &mut BytesMut) -> Result<bool>;
}
