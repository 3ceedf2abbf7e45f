//! Networking layer
//!
//! - `buffer` - protocol buffer with the 317 read/write primitives
//! - `connection` - per-bot socket, queues and session state
//! - `future` - login completion barrier
//! - `group` - username-keyed registry and lazy IO thread
//! - `reactor` - the selector-driven event loop itself

pub mod buffer;
pub mod connection;
pub mod future;
pub mod group;
pub(crate) mod reactor;

pub use buffer::{ByteOrder, ByteTransform, PacketBuffer};
pub use connection::{Bot, ConnState};
pub use future::LoginFuture;
pub use group::BotGroup;
