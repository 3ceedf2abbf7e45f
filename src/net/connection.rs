//! Bot connection
//!
//! Each bot is split across a thread boundary:
//!
//! - [`Bot`] is the shared handle held in the group registry and by user
//!   code. It carries the credentials, the connection state, the outbound
//!   message FIFO and the login barrier. `write` may be called from any
//!   thread; it enqueues and nudges the reactor through its waker.
//! - [`BotConnection`] is the reactor-owned half: the non-blocking socket,
//!   the read and write buffers, the parser state and both keystreams. Only
//!   the IO thread touches it.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use mio::net::TcpStream;
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::config::GroupConfig;
use crate::crypto::Isaac;
use crate::error::{NetworkError, ProtocolError, Result};
use crate::net::future::LoginFuture;
use crate::net::reactor::{Command, ReactorShared};
use crate::protocol::login::Credentials;
use crate::protocol::outgoing::OutboundMessage;
use crate::protocol::{DecodeState, GameMessage};

/// Minimum read buffer capacity per connection
const READ_BUFFER_CAPACITY: usize = 256;

/// Stack chunk size for draining the socket
const READ_CHUNK: usize = 4096;

/// Connection state in the session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnState {
    /// Registered with the group, connect not yet completed
    Registered,
    /// Connected; emitting the initial login request
    InitialRequest,
    /// Waiting on the server's seed exchange
    InitialResponse,
    /// Waiting on the server's login acknowledgement
    FinalResponse,
    /// Session established; game traffic flows
    LoggedIn,
    /// Closed. Terminal.
    LoggedOut,
}

impl ConnState {
    /// Check if the connection still participates in the event loop
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnState::LoggedOut)
    }

    /// Check if the handshake has completed
    pub fn is_logged_in(&self) -> bool {
        matches!(self, ConnState::LoggedIn)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConnState::Registered => "Registered",
            ConnState::InitialRequest => "InitialRequest",
            ConnState::InitialResponse => "InitialResponse",
            ConnState::FinalResponse => "FinalResponse",
            ConnState::LoggedIn => "LoggedIn",
            ConnState::LoggedOut => "LoggedOut",
        }
    }
}

impl std::fmt::Display for ConnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Shared, thread-safe handle to a single bot
pub struct Bot {
    credentials: Credentials,
    token: usize,
    state: Mutex<ConnState>,
    outbound: Mutex<VecDeque<GameMessage>>,
    login: LoginFuture,
    reactor: Arc<ReactorShared>,
}

impl Bot {
    pub(crate) fn new(credentials: Credentials, token: usize, reactor: Arc<ReactorShared>) -> Self {
        Self {
            credentials,
            token,
            state: Mutex::new(ConnState::Registered),
            outbound: Mutex::new(VecDeque::new()),
            login: LoginFuture::new(),
            reactor,
        }
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    pub(crate) fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub(crate) fn token(&self) -> usize {
        self.token
    }

    /// Current connection state
    pub fn state(&self) -> ConnState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ConnState) {
        *self.state.lock() = state;
    }

    /// Whether the session is established
    pub fn is_logged_in(&self) -> bool {
        self.state().is_logged_in()
    }

    /// Barrier resolved when the login attempt settles
    pub fn login_future(&self) -> &LoginFuture {
        &self.login
    }

    /// Queue a game message for dispatch.
    ///
    /// Writes before the session is established are silent no-ops by
    /// contract; only the login codec writes to the socket pre-session.
    pub fn write(&self, message: GameMessage) {
        if !self.is_logged_in() {
            trace!(
                username = %self.username(),
                opcode = message.opcode(),
                "Dropped write on non-established session"
            );
            return;
        }
        self.outbound.lock().push_back(message);
        self.reactor.push(Command::ArmWrite(self.token));
    }

    /// Frame and queue a typed outbound packet
    pub fn send<M: OutboundMessage>(&self, packet: &M) -> Result<()> {
        self.write(packet.into_message()?);
        Ok(())
    }

    pub(crate) fn pop_outbound(&self) -> Option<GameMessage> {
        self.outbound.lock().pop_front()
    }

    pub(crate) fn has_outbound(&self) -> bool {
        !self.outbound.lock().is_empty()
    }

    /// Terminal transition: mark closed and release login waiters
    pub(crate) fn mark_logged_out(&self) {
        self.set_state(ConnState::LoggedOut);
        self.outbound.lock().clear();
        self.login.complete(false);
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("username", &self.username())
            .field("state", &self.state())
            .finish()
    }
}

/// Reactor-owned half of a bot connection
pub(crate) struct BotConnection {
    stream: TcpStream,
    handle: Arc<Bot>,
    read_buf: BytesMut,
    write_buf: BytesMut,
    decode_state: DecodeState,
    encryptor: Option<Isaac>,
    decryptor: Option<Isaac>,
}

impl BotConnection {
    pub(crate) fn new(stream: TcpStream, handle: Arc<Bot>) -> Self {
        Self {
            stream,
            handle,
            read_buf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            write_buf: BytesMut::new(),
            decode_state: DecodeState::new(),
            encryptor: None,
            decryptor: None,
        }
    }

    pub(crate) fn handle(&self) -> &Arc<Bot> {
        &self.handle
    }

    pub(crate) fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub(crate) fn is_connecting(&self) -> bool {
        self.handle.state() == ConnState::Registered
    }

    /// Whether the reactor should keep write readiness armed
    pub(crate) fn wants_write(&self) -> bool {
        !self.write_buf.is_empty()
            || (self.handle.state() == ConnState::LoggedIn && self.handle.has_outbound())
    }

    /// Resolve a pending non-blocking connect.
    ///
    /// Returns `false` on a spurious wake-up while the connect is still in
    /// flight.
    pub(crate) fn try_finish_connect(&mut self) -> Result<bool> {
        if let Some(err) = self.stream.take_error()? {
            return Err(NetworkError::ConnectFailed(err.to_string()).into());
        }
        match self.stream.peer_addr() {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(false),
            Err(err) => Err(NetworkError::ConnectFailed(err.to_string()).into()),
        }
    }

    /// Emit the stage-1 login frame straight onto the socket
    pub(crate) fn begin_login(&mut self, config: &GroupConfig) -> Result<()> {
        self.handle.set_state(ConnState::InitialRequest);
        let frame = config.login_codec.initial_request(self.handle.username());
        debug!(username = %self.handle.username(), "Sent initial login request");
        self.write_raw(frame.as_bytes())?;
        self.handle.set_state(ConnState::InitialResponse);
        Ok(())
    }

    /// Drain the socket into the read buffer, then run whichever codec the
    /// current state calls for.
    pub(crate) fn on_readable(&mut self, config: &GroupConfig) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(NetworkError::ConnectionClosed.into()),
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(NetworkError::ReadError(err.to_string()).into()),
            }
        }
        self.process(config)
    }

    fn process(&mut self, config: &GroupConfig) -> Result<()> {
        loop {
            match self.handle.state() {
                ConnState::InitialResponse => {
                    let step = config.login_codec.initial_response(
                        self.handle.credentials(),
                        config.rsa_key.as_ref(),
                        &mut self.read_buf,
                    )?;
                    match step {
                        Some(handshake) => {
                            self.encryptor = Some(handshake.encryptor);
                            self.decryptor = Some(handshake.decryptor);
                            self.write_raw(handshake.frame.as_bytes())?;
                            self.handle.set_state(ConnState::FinalResponse);
                        }
                        None => return Ok(()),
                    }
                }
                ConnState::FinalResponse => {
                    if !config.login_codec.final_response(&mut self.read_buf)? {
                        return Ok(());
                    }
                    self.handle.set_state(ConnState::LoggedIn);
                    info!(username = %self.handle.username(), "Logged in");
                    self.handle.login_future().complete(true);
                }
                ConnState::LoggedIn => {
                    let decryptor = self
                        .decryptor
                        .as_mut()
                        .ok_or(ProtocolError::CipherNotSeeded)?;
                    let mut messages = Vec::new();
                    config.message_decoder.decode(
                        &mut self.decode_state,
                        decryptor,
                        &mut self.read_buf,
                        &mut messages,
                    )?;
                    for message in messages {
                        (config.message_handler)(&self.handle, message);
                    }
                    return Ok(());
                }
                _ => return Ok(()),
            }
        }
    }

    /// Flush pending bytes, then drain the outbound queue through the
    /// encoder while the socket accepts more.
    pub(crate) fn on_writable(&mut self, config: &GroupConfig) -> Result<()> {
        self.flush()?;

        while self.write_buf.is_empty() && self.handle.state() == ConnState::LoggedIn {
            let Some(message) = self.handle.pop_outbound() else {
                break;
            };
            let encryptor = self
                .encryptor
                .as_mut()
                .ok_or(ProtocolError::CipherNotSeeded)?;
            config
                .message_encoder
                .encode(&message, encryptor, &mut self.write_buf)?;
            self.flush()?;
        }
        Ok(())
    }

    /// Queue raw frame bytes and push them at the socket; used by the login
    /// stages, which bypass the game message queue.
    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_buf.extend_from_slice(bytes);
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => {
                    return Err(NetworkError::WriteError("socket closed".into()).into());
                }
                Ok(n) => self.write_buf.advance(n),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(NetworkError::WriteError(err.to_string()).into()),
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for BotConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConnection")
            .field("username", &self.handle.username())
            .field("state", &self.handle.state())
            .field("buffered_read", &self.read_buf.len())
            .field("buffered_write", &self.write_buf.len())
            .finish()
    }
}
