//! Botscape Client Library
//!
//! Drives groups of simulated players through the revision-317 game
//! protocol: non-blocking TCP, the three-step RSA login handshake, ISAAC
//! opcode masking, and length-tagged bit-and-byte packed game frames, all
//! multiplexed by a single IO thread per group.
//!
//! ## Modules
//!
//! - `config` - group configuration and validation
//! - `crypto` - ISAAC keystream and RSA public-key encryption
//! - `error` - error types and result definitions
//! - `net` - buffers, connections, the reactor and the bot group
//! - `protocol` - login handshake and game frame codecs
//!
//! ## Quick start
//!
//! ```no_run
//! use botscape::{BotGroup, GroupConfig};
//! use std::time::Duration;
//!
//! let group = BotGroup::new(GroupConfig::new());
//! let bot = group.add("fisher02", "hunter2").unwrap();
//! if bot.login_future().wait_timeout(Duration::from_secs(10)) {
//!     bot.send(&botscape::protocol::outgoing::ChatPacket::new("hi")).unwrap();
//! }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod net;
pub mod protocol;

// Re-export commonly used types
pub use config::{GroupConfig, GroupSettings};
pub use error::{BotscapeError, LoginResponse, Result};
pub use net::{Bot, BotGroup, ConnState, PacketBuffer};
pub use protocol::{GameMessage, REVISION};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
