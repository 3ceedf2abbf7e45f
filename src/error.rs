//! Error handling module
//!
//! Defines custom error types for the Botscape client library.

use std::io;

use thiserror::Error;

/// Main error type for the Botscape client
#[derive(Error, Debug)]
pub enum BotscapeError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Protocol-related errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Login handshake errors
    #[error("Login error: {0}")]
    Login(#[from] LoginError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Bot not registered: {0}")]
    BotNotRegistered(String),

    #[error("Bot already registered: {0}")]
    DuplicateBot(String),

    #[error("Event loop terminated")]
    LoopTerminated,

    #[error("Read error: {0}")]
    ReadError(String),

    #[error("Write error: {0}")]
    WriteError(String),
}

/// Protocol-specific errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Buffer underflow: needed {needed} bytes, {available} available")]
    BufferUnderflow { needed: usize, available: usize },

    #[error("Byte order {order} is 32-bit only, got a {bits}-bit value")]
    UnsupportedWidth { order: &'static str, bits: u32 },

    #[error("Bit count out of range: {0} (must be 1..=32)")]
    BitCountOutOfRange(u32),

    #[error("Bit access used outside start/end block")]
    BitAccessMisuse,

    #[error("Variable-length terminator without an open message")]
    VarLengthMissing,

    #[error("Variable-length body too large: {0} bytes")]
    VarLengthOverflow(usize),

    #[error("Unknown packet length table entry for opcode {0}")]
    UnknownOpcodeLength(u8),

    #[error("Cipher used before the handshake seeded it")]
    CipherNotSeeded,

    #[error("RSA plaintext too large for modulus")]
    RsaBlockTooLarge,
}

/// Login handshake errors
#[derive(Error, Debug)]
pub enum LoginError {
    #[error("Login rejected at {stage}: {response}")]
    Rejected {
        stage: &'static str,
        response: LoginResponse,
    },

    #[error("Handshake out of order: {0}")]
    OutOfOrder(&'static str),
}

/// Result type alias for Botscape operations
pub type Result<T> = std::result::Result<T, BotscapeError>;

/// Response codes the 317 login protocol can answer with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginResponse {
    /// Exchange keys and continue
    ExchangeKeys,
    /// Delay login (wait 2 seconds)
    Delay,
    /// Successful login
    Success,
    /// Invalid username or password
    InvalidCredentials,
    /// Account is disabled
    AccountDisabled,
    /// Account is already logged in
    AlreadyLoggedIn,
    /// Game has been updated
    GameUpdated,
    /// World is full
    WorldFull,
    /// Login server offline
    LoginServerOffline,
    /// Login limit exceeded
    LoginLimitExceeded,
    /// Bad session ID
    BadSessionId,
    /// Login server rejected session
    LoginServerRejected,
    /// Need members account
    MembersAccount,
    /// Could not complete login
    CouldNotCompleteLogin,
    /// Server being updated
    ServerUpdating,
    /// Too many incorrect logins
    TooManyIncorrectLogins,
    /// Standing in members area
    StandingInMembersArea,
    /// Account locked
    AccountLocked,
    /// Code the table does not name
    Unknown(u8),
}

impl LoginResponse {
    /// Map a wire byte onto a response code
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::ExchangeKeys,
            1 => Self::Delay,
            2 => Self::Success,
            3 => Self::InvalidCredentials,
            4 => Self::AccountDisabled,
            5 => Self::AlreadyLoggedIn,
            6 => Self::GameUpdated,
            7 => Self::WorldFull,
            8 => Self::LoginServerOffline,
            9 => Self::LoginLimitExceeded,
            10 => Self::BadSessionId,
            11 => Self::LoginServerRejected,
            12 => Self::MembersAccount,
            13 => Self::CouldNotCompleteLogin,
            14 => Self::ServerUpdating,
            16 => Self::TooManyIncorrectLogins,
            17 => Self::StandingInMembersArea,
            18 => Self::AccountLocked,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::ExchangeKeys => 0,
            Self::Delay => 1,
            Self::Success => 2,
            Self::InvalidCredentials => 3,
            Self::AccountDisabled => 4,
            Self::AlreadyLoggedIn => 5,
            Self::GameUpdated => 6,
            Self::WorldFull => 7,
            Self::LoginServerOffline => 8,
            Self::LoginLimitExceeded => 9,
            Self::BadSessionId => 10,
            Self::LoginServerRejected => 11,
            Self::MembersAccount => 12,
            Self::CouldNotCompleteLogin => 13,
            Self::ServerUpdating => 14,
            Self::TooManyIncorrectLogins => 16,
            Self::StandingInMembersArea => 17,
            Self::AccountLocked => 18,
            Self::Unknown(code) => code,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ExchangeKeys => "ExchangeKeys",
            Self::Delay => "Delay",
            Self::Success => "Success",
            Self::InvalidCredentials => "InvalidCredentials",
            Self::AccountDisabled => "AccountDisabled",
            Self::AlreadyLoggedIn => "AlreadyLoggedIn",
            Self::GameUpdated => "GameUpdated",
            Self::WorldFull => "WorldFull",
            Self::LoginServerOffline => "LoginServerOffline",
            Self::LoginLimitExceeded => "LoginLimitExceeded",
            Self::BadSessionId => "BadSessionId",
            Self::LoginServerRejected => "LoginServerRejected",
            Self::MembersAccount => "MembersAccount",
            Self::CouldNotCompleteLogin => "CouldNotCompleteLogin",
            Self::ServerUpdating => "ServerUpdating",
            Self::TooManyIncorrectLogins => "TooManyIncorrectLogins",
            Self::StandingInMembersArea => "StandingInMembersArea",
            Self::AccountLocked => "AccountLocked",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl std::fmt::Display for LoginResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.as_u8())
    }
}
