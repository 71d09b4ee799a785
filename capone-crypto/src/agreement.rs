//! Ephemeral X25519 key agreement.
//!
//! One pair is generated per handshake and consumed by [`EphemeralKeyPair::agree`];
//! the secret scalar is zeroized on drop by the dalek types.

use x25519_dalek::{PublicKey, StaticSecret};

use crate::KeyError;

/// A fresh agreement key pair, alive for a single handshake.
pub struct EphemeralKeyPair {
    secret: StaticSecret,
    public: [u8; 32],
}

impl EphemeralKeyPair {
    /// Generate a pair from system randomness.
    pub fn generate() -> Result<Self, KeyError> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed).map_err(|_| KeyError::RandomnessFailed)?;
        let secret = StaticSecret::from(seed);
        let public = PublicKey::from(&secret).to_bytes();
        Ok(Self { secret, public })
    }

    /// The public half, sent to the peer inside a signed handshake message.
    pub fn public(&self) -> &[u8; 32] {
        &self.public
    }

    /// Scalar-multiply our secret with the peer's public key.
    ///
    /// Consumes the pair: after agreement the secret has no further use and
    /// must not outlive the handshake.
    pub fn agree(self, peer_public: &[u8; 32]) -> [u8; 32] {
        let shared = self.secret.diffie_hellman(&PublicKey::from(*peer_public));
        shared.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_agree_on_the_same_secret() {
        let a = EphemeralKeyPair::generate().unwrap();
        let b = EphemeralKeyPair::generate().unwrap();
        let pk_a = *a.public();
        let pk_b = *b.public();
        assert_eq!(a.agree(&pk_b), b.agree(&pk_a));
    }

    #[test]
    fn unrelated_pairs_produce_distinct_secrets() {
        let a = EphemeralKeyPair::generate().unwrap();
        let b = EphemeralKeyPair::generate().unwrap();
        let c = EphemeralKeyPair::generate().unwrap();
        let d = EphemeralKeyPair::generate().unwrap();
        let pk_b = *b.public();
        let pk_d = *d.public();
        assert_ne!(a.agree(&pk_b), c.agree(&pk_d));
    }
}
