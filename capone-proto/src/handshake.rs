//! The encryption handshake: mutual authentication + key agreement.
//!
//! Both sides generate an ephemeral X25519 pair and exchange
//! [`SessionKeyMessage`]s carrying their long-term identity, the ephemeral
//! public key, and a signature binding the two. The shared key is
//!
//! ```text
//! key = H(scalarmult(eph_sk, peer_eph_pk) ‖ initiator_eph_pk ‖ responder_eph_pk)
//! ```
//!
//! Each side therefore feeds the two public keys to the hash in a different
//! local order (own-first on the initiator, received-first on the responder)
//! so that both compute identical bytes. See the cross-side test at the
//! bottom before touching any of this.

use std::fmt;

use capone_crypto::{EphemeralKeyPair, KeyError, SignKeyPair, SignPublicKey, SymmetricKey, hash32};
use capone_wire::messages::SessionKeyMessage;

use crate::channel::{Channel, ChannelError, Side};

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors that can occur while negotiating encryption.
#[derive(Debug)]
pub enum HandshakeError {
    /// The peer presented a different identity than expected.
    PeerIdentityMismatch,
    /// The signature over the ephemeral key did not verify.
    BadSignature,
    /// Generating the ephemeral key pair failed.
    Key(KeyError),
    /// Sending or receiving a handshake message failed.
    Channel(ChannelError),
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerIdentityMismatch => write!(f, "peer identity does not match expected key"),
            Self::BadSignature         => write!(f, "ephemeral key signature did not verify"),
            Self::Key(e)               => write!(f, "key generation failed: {e}"),
            Self::Channel(e)           => write!(f, "handshake I/O failed: {e}"),
        }
    }
}

impl std::error::Error for HandshakeError {}

impl From<KeyError> for HandshakeError {
    fn from(e: KeyError) -> Self { Self::Key(e) }
}

impl From<ChannelError> for HandshakeError {
    fn from(e: ChannelError) -> Self { Self::Channel(e) }
}

// ─── Protocol ────────────────────────────────────────────────────────────────

/// Run the handshake as the initiator.
///
/// `expected` pins the responder's long-term identity; any other peer fails
/// fast with [`HandshakeError::PeerIdentityMismatch`]. On success the channel
/// is encrypted with client-side nonces.
pub fn initiate(
    channel: &mut Channel,
    sign_keys: &SignKeyPair,
    expected: &SignPublicKey,
) -> Result<(), HandshakeError> {
    let local = EphemeralKeyPair::generate()?;

    send_session_key(channel, sign_keys, local.public())?;
    let (remote_sign, remote_encrypt) = receive_session_key(channel)?;

    if remote_sign != *expected {
        return Err(HandshakeError::PeerIdentityMismatch);
    }

    let local_public = *local.public();
    let shared = local.agree(&remote_encrypt);
    let key = SymmetricKey::from_bytes(hash32(&[&shared, &local_public, &remote_encrypt]));

    channel.enable_encryption(key, Side::Client);

    Ok(())
}

/// Run the handshake as the responder.
///
/// The responder accepts any identity that proves possession of its signing
/// key and returns it; access control happens later against the ACLs. On
/// success the channel is encrypted with server-side nonces.
pub fn await_encryption(
    channel: &mut Channel,
    sign_keys: &SignKeyPair,
) -> Result<SignPublicKey, HandshakeError> {
    let local = EphemeralKeyPair::generate()?;

    let (remote_sign, remote_encrypt) = receive_session_key(channel)?;
    send_session_key(channel, sign_keys, local.public())?;

    let local_public = *local.public();
    let shared = local.agree(&remote_encrypt);
    let key = SymmetricKey::from_bytes(hash32(&[&shared, &remote_encrypt, &local_public]));

    channel.enable_encryption(key, Side::Server);

    Ok(remote_sign)
}

fn send_session_key(
    channel: &mut Channel,
    sign_keys: &SignKeyPair,
    encrypt_pk: &[u8; 32],
) -> Result<(), HandshakeError> {
    let message = SessionKeyMessage {
        sign_pk:    sign_keys.public().0,
        encrypt_pk: *encrypt_pk,
        signature:  sign_keys.sign(encrypt_pk),
    };
    channel.write_typed(&message)?;
    Ok(())
}

fn receive_session_key(
    channel: &mut Channel,
) -> Result<(SignPublicKey, [u8; 32]), HandshakeError> {
    let message: SessionKeyMessage = channel.read_typed()?;

    let remote_sign = SignPublicKey(message.sign_pk);
    if !remote_sign.verify(&message.encrypt_pk, &message.signature) {
        return Err(HandshakeError::BadSignature);
    }

    Ok((remote_sign, message.encrypt_pk))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
