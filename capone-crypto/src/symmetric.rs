//! Symmetric authenticated encryption for channel blocks.
//!
//! XChaCha20-Poly1305: 32-byte keys, 24-byte nonces, 16-byte tags. Nonces
//! are little-endian counters owned by the channel; this module only
//! provides the seal/open primitives and the counter arithmetic.

use std::fmt;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};

use crate::KeyError;

/// Length of a symmetric key in bytes.
pub const KEY_LEN: usize = 32;
/// Length of a block nonce in bytes.
pub const NONCE_LEN: usize = 24;
/// Length of the authentication tag appended to each sealed block.
pub const TAG_LEN: usize = 16;

// ─── SymmetricKey ────────────────────────────────────────────────────────────

/// A 32-byte symmetric key. Never transmitted.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey(pub(crate) [u8; KEY_LEN]);

impl SymmetricKey {
    /// Generate a fresh key from system randomness.
    pub fn generate() -> Result<Self, KeyError> {
        let mut data = [0u8; KEY_LEN];
        getrandom::getrandom(&mut data).map_err(|_| KeyError::RandomnessFailed)?;
        Ok(Self(data))
    }

    /// Wrap raw key bytes.
    pub fn from_bytes(data: [u8; KEY_LEN]) -> Self {
        Self(data)
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        if hex.len() != KEY_LEN * 2 {
            return Err(KeyError::InvalidLength { got: hex.len(), expected: KEY_LEN * 2 });
        }
        let mut data = [0u8; KEY_LEN];
        hex::decode_to_slice(hex, &mut data).map_err(|_| KeyError::InvalidHex)?;
        Ok(Self(data))
    }

    /// Hex representation (lowercase).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Encrypt and authenticate `plaintext` under `nonce`.
    ///
    /// The output is `plaintext.len() + TAG_LEN` bytes: ciphertext followed
    /// by the Poly1305 tag.
    pub fn seal(&self, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>, AeadError> {
        XChaCha20Poly1305::new(Key::from_slice(&self.0))
            .encrypt(XNonce::from_slice(&nonce.0), plaintext)
            .map_err(|_| AeadError)
    }

    /// Verify and decrypt a sealed block.
    ///
    /// Fails if the tag does not authenticate under this key and nonce.
    pub fn open(&self, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>, AeadError> {
        XChaCha20Poly1305::new(Key::from_slice(&self.0))
            .decrypt(XNonce::from_slice(&nonce.0), ciphertext)
            .map_err(|_| AeadError)
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material stays out of logs.
        write!(f, "SymmetricKey(..)")
    }
}

// ─── Nonce ───────────────────────────────────────────────────────────────────

/// A 24-byte block nonce, treated as a little-endian counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce(pub(crate) [u8; NONCE_LEN]);

impl Nonce {
    /// The all-zero nonce.
    pub fn zero() -> Self {
        Self([0u8; NONCE_LEN])
    }

    /// Add `by` to the counter, little-endian with carry.
    pub fn advance(&mut self, by: u64) {
        let mut carry = by as u128;
        for byte in self.0.iter_mut() {
            if carry == 0 {
                break;
            }
            let sum = *byte as u128 + (carry & 0xff);
            *byte = sum as u8;
            carry = (carry >> 8) + (sum >> 8);
        }
    }

    /// Raw nonce bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

// ─── AeadError ───────────────────────────────────────────────────────────────

/// Authenticated encryption or decryption failed.
///
/// Deliberately carries no detail: a failed tag check must be
/// indistinguishable from any other cipher failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AeadError;

impl fmt::Display for AeadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "authenticated encryption failed")
    }
}

impl std::error::Error for AeadError {}

// ─── Tests ───────────────────────────────────────────────────────────────────
