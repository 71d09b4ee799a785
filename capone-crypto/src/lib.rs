//! Cryptographic primitives for the Capone protocol.
//!
//! Provides:
//! - Long-term Ed25519 signing identities ([`SignKeyPair`], [`SignPublicKey`])
//! - Ephemeral X25519 key agreement ([`EphemeralKeyPair`])
//! - XChaCha20-Poly1305 block encryption ([`SymmetricKey`], [`Nonce`])
//! - The 32-byte generic hash ([`hash32`]) for capability chains and
//!   handshake key derivation

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod agreement;
pub mod hash;
pub mod sign;
pub mod symmetric;

pub use agreement::EphemeralKeyPair;
pub use hash::hash32;
pub use sign::{SIGNATURE_LEN, SignKeyPair, SignPublicKey};
pub use symmetric::{AeadError, KEY_LEN, NONCE_LEN, Nonce, SymmetricKey, TAG_LEN};

use std::fmt;

// ─── KeyError ────────────────────────────────────────────────────────────────

/// Errors that can occur when loading or generating key material.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyError {
    /// A hex string had the wrong length.
    InvalidLength {
        /// Length of the rejected input.
        got: usize,
        /// Length a well-formed input would have.
        expected: usize,
    },
    /// A string contained non-hex characters.
    InvalidHex,
    /// A configured public key does not belong to the configured secret key.
    KeyMismatch,
    /// The system randomness source failed.
    RandomnessFailed,
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength { got, expected }
                => write!(f, "key has length {got}, expected {expected}"),
            Self::InvalidHex       => write!(f, "key is not valid hex"),
            Self::KeyMismatch      => write!(f, "public key does not match secret key"),
            Self::RandomnessFailed => write!(f, "system randomness source failed"),
        }
    }
}

impl std::error::Error for KeyError {}
