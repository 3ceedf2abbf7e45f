//! Cryptographic utilities for the 317 protocol
//!
//! - `isaac` - ISAAC keystream generator for opcode masking
//! - `rsa` - public-key encryption of the login secure block

pub mod isaac;
pub mod rsa;

pub use isaac::Isaac;
pub use rsa::RsaPublicKey;

/// Offset added to each seed word when deriving the inbound keystream
pub const DECRYPTOR_SEED_OFFSET: u32 = 50;
