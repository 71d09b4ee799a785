//! Long-term signing identities.
//!
//! Every principal is named by its Ed25519 verification key. Key pairs are
//! loaded from configuration (hex) or generated fresh for tests; the secret
//! half is only ever used to sign ephemeral handshake keys.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::KeyError;

/// Length of a detached signature in bytes.
pub const SIGNATURE_LEN: usize = 64;

// ─── SignPublicKey ───────────────────────────────────────────────────────────

/// A principal's public identity: a 32-byte Ed25519 verification key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignPublicKey(
    /// The raw key bytes.
    pub [u8; 32],
);

impl SignPublicKey {
    /// Parse from a 64-character hex string.
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        if hex.len() != 64 {
            return Err(KeyError::InvalidLength { got: hex.len(), expected: 64 });
        }
        let mut data = [0u8; 32];
        hex::decode_to_slice(hex, &mut data).map_err(|_| KeyError::InvalidHex)?;
        Ok(Self(data))
    }

    /// Hex representation (lowercase).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Verify a detached signature over `message`.
    ///
    /// Returns `false` both for a bad signature and for bytes that do not
    /// form a valid verification key; the caller never learns which.
    pub fn verify(&self, message: &[u8], signature: &[u8; SIGNATURE_LEN]) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        key.verify(message, &Signature::from_bytes(signature)).is_ok()
    }
}

impl fmt::Display for SignPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SignPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignPublicKey({})", self.to_hex())
    }
}

// ─── SignKeyPair ─────────────────────────────────────────────────────────────

/// A long-term signing key pair.
pub struct SignKeyPair {
    secret: SigningKey,
    public: SignPublicKey,
}

impl SignKeyPair {
    /// Generate a fresh key pair from system randomness.
    pub fn generate() -> Result<Self, KeyError> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed).map_err(|_| KeyError::RandomnessFailed)?;
        Ok(Self::from_seed(&seed))
    }

    /// Build a key pair from a 32-byte secret seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let secret = SigningKey::from_bytes(seed);
        let public = SignPublicKey(secret.verifying_key().to_bytes());
        Self { secret, public }
    }

    /// Reconstruct a key pair from hex-encoded public and secret keys.
    ///
    /// The secret key is the 32-byte Ed25519 seed. The public key must match
    /// the one derived from the seed; a mismatch means the configuration was
    /// edited inconsistently.
    pub fn from_hex(public_hex: &str, secret_hex: &str) -> Result<Self, KeyError> {
        if secret_hex.len() != 64 {
            return Err(KeyError::InvalidLength { got: secret_hex.len(), expected: 64 });
        }
        let mut seed = [0u8; 32];
        hex::decode_to_slice(secret_hex, &mut seed).map_err(|_| KeyError::InvalidHex)?;

        let pair = Self::from_seed(&seed);
        if SignPublicKey::from_hex(public_hex)? != pair.public {
            return Err(KeyError::KeyMismatch);
        }

        Ok(pair)
    }

    /// The public identity half.
    pub fn public(&self) -> &SignPublicKey {
        &self.public
    }

    /// Produce a detached signature over `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.secret.sign(message).to_bytes()
    }
}

impl fmt::Debug for SignKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignKeyPair({})", self.public.to_hex())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
