//! The client half of the protocol engine.
//!
//! Every command follows the same prelude: open a TCP channel, run the
//! handshake against the expected server identity, send the command
//! envelope, then the verb-specific exchange.

use std::fmt;

use capone_crypto::{SignKeyPair, SignPublicKey};
use capone_wire::messages::{
    Command, CommandEnvelope, ServiceDescription, SessionAnnouncement, SessionRequest,
    SessionResult, SessionStart, SessionTermination,
};

use crate::caps::Capability;
use crate::channel::{Channel, ChannelError, ChannelType};
use crate::handshake::{self, HandshakeError};

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors from client-side command exchanges.
#[derive(Debug)]
pub enum ClientError {
    /// Connecting or exchanging messages failed.
    Channel(ChannelError),
    /// The handshake failed (wrong server identity, bad signature, I/O).
    Handshake(HandshakeError),
    /// The server answered with a nonzero result code.
    Rejected(i32),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(e)      => write!(f, "channel error: {e}"),
            Self::Handshake(e)    => write!(f, "handshake failed: {e}"),
            Self::Rejected(code)  => write!(f, "server rejected the request (result {code})"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ChannelError> for ClientError {
    fn from(e: ChannelError) -> Self { Self::Channel(e) }
}

impl From<HandshakeError> for ClientError {
    fn from(e: HandshakeError) -> Self { Self::Handshake(e) }
}

// ─── Command prelude ─────────────────────────────────────────────────────────

/// Connect to `host:port`, authenticate the server as `server_key`, and
/// announce `command`. Returns the encrypted channel, ready for the verb's
/// message exchange.
pub fn connect_to(
    host: &str,
    port: u16,
    sign_keys: &SignKeyPair,
    server_key: &SignPublicKey,
    command: Command,
) -> Result<Channel, ClientError> {
    let mut channel = Channel::from_host(host, port, ChannelType::Tcp)?;
    channel.connect()?;

    handshake::initiate(&mut channel, sign_keys, server_key)?;
    channel.write_typed(&CommandEnvelope { command })?;

    Ok(channel)
}

// ─── Verbs ───────────────────────────────────────────────────────────────────

/// QUERY: receive the service description.
pub fn query(channel: &mut Channel) -> Result<ServiceDescription, ClientError> {
    Ok(channel.read_typed()?)
}

/// REQUEST: submit opaque service parameters, receive the new session's
/// identifier and a capability granting EXEC and TERM over it.
pub fn request(
    channel: &mut Channel,
    parameters: &[u8],
) -> Result<(u32, Capability), ClientError> {
    channel.write_typed(&SessionRequest { parameters: parameters.to_vec() })?;

    let announcement: SessionAnnouncement = channel.read_typed()?;
    Ok((
        announcement.identifier,
        Capability::from_message(&announcement.cap),
    ))
}

/// CONNECT: present a capability for a session. On success the channel is
/// ready for the service exchange; the caller usually passes it to the
/// plugin's `invoke`.
pub fn start_session(
    channel: &mut Channel,
    identifier: u32,
    cap: &Capability,
) -> Result<(), ClientError> {
    channel.write_typed(&SessionStart { identifier, cap: cap.to_message() })?;

    let result: SessionResult = channel.read_typed()?;
    if result.result != 0 {
        return Err(ClientError::Rejected(result.result));
    }

    Ok(())
}

/// TERMINATE: ask the server to kill a session. The server never answers;
/// a success only means the request was delivered.
pub fn terminate(
    channel: &mut Channel,
    identifier: u32,
    cap: &Capability,
) -> Result<(), ClientError> {
    channel.write_typed(&SessionTermination { identifier, cap: cap.to_message() })?;
    Ok(())
}
