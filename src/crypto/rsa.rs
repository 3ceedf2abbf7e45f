//! RSA encryption for the login protocol
//!
//! The client encrypts its secure block (ISAAC seeds, credentials) with the
//! server's public key before it leaves the socket. Only the public half
//! exists on this side; decryption is the server's problem.

use std::fmt;

use anyhow::{Context, Result};
use num_bigint::BigUint;

use crate::error::ProtocolError;

/// RSA public key (modulus and public exponent)
#[derive(Clone)]
pub struct RsaPublicKey {
    /// RSA modulus (N)
    modulus: BigUint,
    /// RSA public exponent (E) - typically 65537
    exponent: BigUint,
}

impl RsaPublicKey {
    /// Create a public key from raw BigUint values
    pub fn new(modulus: BigUint, exponent: BigUint) -> Self {
        Self { modulus, exponent }
    }

    /// Create a public key from a hex modulus and a decimal exponent
    pub fn from_hex(modulus: &str, exponent: u64) -> Result<Self> {
        let modulus = BigUint::parse_bytes(modulus.as_bytes(), 16)
            .context("Failed to parse RSA modulus")?;
        Ok(Self {
            modulus,
            exponent: BigUint::from(exponent),
        })
    }

    /// Get the key size in bits
    pub fn key_size_bits(&self) -> usize {
        self.modulus.bits() as usize
    }

    /// Get the key size in bytes
    pub fn key_size_bytes(&self) -> usize {
        (self.key_size_bits() + 7) / 8
    }

    /// Encrypt a plaintext block: `(big-endian integer)^e mod n`.
    ///
    /// The plaintext must be numerically smaller than the modulus. The
    /// result is the minimal big-endian representation, unpadded, as the
    /// protocol's length-prefixed framing expects.
    pub fn encrypt(&self, plaintext: &[u8]) -> std::result::Result<Vec<u8>, ProtocolError> {
        let plain_int = BigUint::from_bytes_be(plaintext);
        if plain_int >= self.modulus {
            return Err(ProtocolError::RsaBlockTooLarge);
        }

        let cipher_int = plain_int.modpow(&self.exponent, &self.modulus);
        Ok(cipher_int.to_bytes_be())
    }
}

impl fmt::Debug for RsaPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaPublicKey")
            .field("key_size_bits", &self.key_size_bits())
            .field("exponent", &self.exponent)
            .finish()
    }
}
