//! Group configuration module
//!
//! Two layers, as the split between data and behavior demands:
//!
//! - [`GroupSettings`] is the serde-carried surface (address, RSA key
//!   material), loadable from a TOML file.
//! - [`GroupConfig`] is the validated runtime configuration: parsed
//!   address, parsed key, codec strategies and handler hooks. Construction
//!   fails fast on bad input; nothing is re-validated later.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::crypto::RsaPublicKey;
use crate::error::{BotscapeError, Result};
use crate::net::connection::Bot;
use crate::protocol::{
    GameMessage, LoginCodec, LoginCodec317, MessageDecoder, MessageDecoder317, MessageEncoder,
    MessageEncoder317,
};

/// Hook invoked on the IO thread for every decoded inbound message
pub type MessageHandler = dyn Fn(&Arc<Bot>, GameMessage) + Send + Sync;

/// Hook invoked on the IO thread when a bot's connection fails
pub type ExceptionHandler = dyn Fn(&str, BotscapeError) + Send + Sync;

/// Serializable group settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSettings {
    /// Target server as `host:port`
    #[serde(default = "default_connect_address")]
    pub connect_address: String,

    /// Hex modulus of the server's RSA public key; absent means the login
    /// secure block goes out unencrypted
    #[serde(default)]
    pub rsa_modulus: Option<String>,

    /// RSA public exponent
    #[serde(default = "default_rsa_exponent")]
    pub rsa_exponent: u64,
}

fn default_connect_address() -> String {
    "127.0.0.1:43594".to_string()
}

fn default_rsa_exponent() -> u64 {
    65537
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            connect_address: default_connect_address(),
            rsa_modulus: None,
            rsa_exponent: default_rsa_exponent(),
        }
    }
}

impl GroupSettings {
    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Validate into a runtime configuration
    pub fn into_config(self) -> Result<GroupConfig> {
        let connect_address: SocketAddr = self
            .connect_address
            .parse()
            .map_err(|_| BotscapeError::Config(format!("invalid address: {}", self.connect_address)))?;

        let rsa_key = match &self.rsa_modulus {
            Some(modulus) => Some(
                RsaPublicKey::from_hex(modulus, self.rsa_exponent)
                    .map_err(|err| BotscapeError::Config(format!("invalid RSA key: {err}")))?,
            ),
            None => None,
        };

        Ok(GroupConfig {
            connect_address,
            rsa_key,
            ..GroupConfig::default()
        })
    }
}

/// Validated runtime configuration of one bot group
#[derive(Clone)]
pub struct GroupConfig {
    /// Target server address
    pub connect_address: SocketAddr,
    /// Public key for the login secure block; `None` leaves it plaintext
    pub rsa_key: Option<RsaPublicKey>,
    /// Handshake strategy
    pub login_codec: Arc<dyn LoginCodec>,
    /// Outbound frame cipher strategy
    pub message_encoder: Arc<dyn MessageEncoder>,
    /// Inbound framing strategy
    pub message_decoder: Arc<dyn MessageDecoder>,
    /// Inbound message hook
    pub message_handler: Arc<MessageHandler>,
    /// Connection failure hook
    pub exception_handler: Arc<ExceptionHandler>,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            connect_address: SocketAddr::from(([127, 0, 0, 1], 43594)),
            rsa_key: None,
            login_codec: Arc::new(LoginCodec317),
            message_encoder: Arc::new(MessageEncoder317),
            message_decoder: Arc::new(MessageDecoder317),
            message_handler: Arc::new(|bot, message| {
                trace!(
                    username = %bot.username(),
                    opcode = message.opcode(),
                    size = message.size(),
                    "Dropped unhandled message"
                );
            }),
            exception_handler: Arc::new(|username, err| {
                warn!(username = %username, error = %err, "Bot error");
            }),
        }
    }
}

impl GroupConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target server address
    pub fn with_address(mut self, address: SocketAddr) -> Self {
        self.connect_address = address;
        self
    }

    /// Set the server's RSA public key
    pub fn with_rsa_key(mut self, key: RsaPublicKey) -> Self {
        self.rsa_key = Some(key);
        self
    }

    /// Replace the handshake strategy
    pub fn with_login_codec(mut self, codec: impl LoginCodec + 'static) -> Self {
        self.login_codec = Arc::new(codec);
        self
    }

    /// Replace the outbound cipher strategy
    pub fn with_message_encoder(mut self, encoder: impl MessageEncoder + 'static) -> Self {
        self.message_encoder = Arc::new(encoder);
        self
    }

    /// Replace the inbound framing strategy
    pub fn with_message_decoder(mut self, decoder: impl MessageDecoder + 'static) -> Self {
        self.message_decoder = Arc::new(decoder);
        self
    }

    /// Install the inbound message hook
    pub fn on_message(
        mut self,
        handler: impl Fn(&Arc<Bot>, GameMessage) + Send + Sync + 'static,
    ) -> Self {
        self.message_handler = Arc::new(handler);
        self
    }

    /// Install the connection failure hook
    pub fn on_exception(
        mut self,
        handler: impl Fn(&str, BotscapeError) + Send + Sync + 'static,
    ) -> Self {
        self.exception_handler = Arc::new(handler);
        self
    }
}

impl std::fmt::Debug for GroupConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupConfig")
            .field("connect_address", &self.connect_address)
            .field("rsa_key", &self.rsa_key)
            .finish()
    }
}
