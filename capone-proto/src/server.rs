//! The server half of the protocol engine.
//!
//! Each accepted connection runs [`handle_connection`] on its own task:
//! negotiate encryption, read one command envelope, dispatch. QUERY and
//! REQUEST are gated by ACLs, CONNECT and TERMINATE by capability
//! verification. Authorization failures close the connection without
//! telling the peer why.

use std::fmt;
use std::time::Duration;

use capone_crypto::SignPublicKey;
use capone_wire::messages::{
    Command, CommandEnvelope, SessionAnnouncement, SessionRequest, SessionResult, SessionStart,
    SessionTermination,
};

use crate::acl::Acl;
use crate::caps::{Capability, CapabilityError, Rights};
use crate::channel::{Channel, ChannelError};
use crate::config::Config;
use crate::handshake::{self, HandshakeError};
use crate::service::{Service, ServiceError};
use crate::session::{SessionError, SessionStore};

/// Read timeout applied to the handshake and the short command exchanges,
/// bounding the lifetime of half-open connections. Cleared before a service
/// takes over the channel.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors from handling one server-side connection.
#[derive(Debug)]
pub enum ServerError {
    /// The encryption handshake failed.
    Handshake(HandshakeError),
    /// Channel I/O or framing failed.
    Channel(ChannelError),
    /// The peer is not allowed to run this command.
    AccessDenied,
    /// A presented capability did not verify.
    Capability(CapabilityError),
    /// Session store lookup failed.
    Session(SessionError),
    /// The service plugin failed.
    Service(ServiceError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handshake(e)  => write!(f, "handshake failed: {e}"),
            Self::Channel(e)    => write!(f, "channel error: {e}"),
            Self::AccessDenied  => write!(f, "access denied"),
            Self::Capability(e) => write!(f, "capability error: {e}"),
            Self::Session(e)    => write!(f, "session error: {e}"),
            Self::Service(e)    => write!(f, "service error: {e}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<HandshakeError> for ServerError {
    fn from(e: HandshakeError) -> Self { Self::Handshake(e) }
}

impl From<ChannelError> for ServerError {
    fn from(e: ChannelError) -> Self { Self::Channel(e) }
}

impl From<CapabilityError> for ServerError {
    fn from(e: CapabilityError) -> Self { Self::Capability(e) }
}

impl From<SessionError> for ServerError {
    fn from(e: SessionError) -> Self { Self::Session(e) }
}

impl From<ServiceError> for ServerError {
    fn from(e: ServiceError) -> Self { Self::Service(e) }
}

// ─── Connection driver ───────────────────────────────────────────────────────

/// Everything a connection handler needs, shared across tasks.
pub struct ServerContext<'a> {
    /// This host's long-term identity.
    pub sign_keys:   &'a capone_crypto::SignKeyPair,
    /// The service exposed on this port.
    pub service:     &'a Service,
    /// Full configuration, passed through to service plugins.
    pub config:      &'a Config,
    /// The process-wide session registry.
    pub sessions:    &'a SessionStore,
    /// ACL gating QUERY.
    pub query_acl:   &'a Acl,
    /// ACL gating REQUEST.
    pub request_acl: &'a Acl,
}

/// Drive one accepted connection from handshake to completion.
pub fn handle_connection(mut channel: Channel, ctx: &ServerContext<'_>) -> Result<(), ServerError> {
    channel.set_read_timeout(Some(EXCHANGE_TIMEOUT))?;

    let remote = handshake::await_encryption(&mut channel, ctx.sign_keys)?;
    let envelope: CommandEnvelope = channel.read_typed()?;

    match envelope.command {
        Command::Query => {
            log::debug!("received query from {remote}");
            if !ctx.query_acl.is_allowed(&remote, Rights::EXEC) {
                log::error!("unauthorized query from {remote}");
                return Err(ServerError::AccessDenied);
            }
            handle_query(&mut channel, ctx.service)
        }
        Command::Request => {
            log::debug!("received request from {remote}");
            if !ctx.request_acl.is_allowed(&remote, Rights::EXEC) {
                log::error!("unauthorized request from {remote}");
                return Err(ServerError::AccessDenied);
            }
            handle_request(&mut channel, &remote, ctx)
        }
        Command::Connect => {
            log::debug!("received connect from {remote}");
            handle_connect(channel, &remote, ctx)
        }
        Command::Terminate => {
            log::debug!("received terminate from {remote}");
            handle_termination(&mut channel, &remote, ctx.sessions)
        }
    }
}

/// QUERY: send the service description and close.
pub fn handle_query(channel: &mut Channel, service: &Service) -> Result<(), ServerError> {
    channel.write_typed(&service.describe())?;
    Ok(())
}

/// REQUEST: create a session, delegate a capability to the requester, and
/// announce both. The session is rolled back if the announcement cannot be
/// delivered.
pub fn handle_request(
    channel: &mut Channel,
    remote: &SignPublicKey,
    ctx: &ServerContext<'_>,
) -> Result<(), ServerError> {
    let request: SessionRequest = channel.read_typed()?;

    ctx.service.plugin.decode_params(&request.parameters)?;

    let session = ctx.sessions.add(request.parameters, *remote)?;
    let cap = session.cap.create_ref(Rights::ALL, remote)?;

    let announcement = SessionAnnouncement {
        identifier: session.identifier,
        cap:        cap.to_message(),
    };

    if let Err(e) = channel.write_typed(&announcement) {
        let _ = ctx.sessions.remove(session.identifier);
        return Err(e.into());
    }

    Ok(())
}

/// CONNECT: verify the capability, consume the session, hand the channel to
/// the service plugin.
pub fn handle_connect(
    mut channel: Channel,
    remote: &SignPublicKey,
    ctx: &ServerContext<'_>,
) -> Result<(), ServerError> {
    let start: SessionStart = channel.read_typed()?;
    let presented = Capability::from_message(&start.cap);

    // Look up, verify, then remove: the removal decides a race between two
    // concurrent CONNECTs for the same session.
    let authorized = ctx
        .sessions
        .find(start.identifier)
        .ok()
        .filter(|session| presented.verify(&session.cap, remote, Rights::EXEC).is_ok())
        .and_then(|_| ctx.sessions.remove(start.identifier).ok());

    let Some(session) = authorized else {
        log::error!("could not authorize session {} for {remote}", start.identifier);
        channel.write_typed(&SessionResult { result: -1 })?;
        return Err(ServerError::AccessDenied);
    };

    channel.write_typed(&SessionResult { result: 0 })?;

    // The service may legitimately idle longer than a protocol exchange.
    channel.set_read_timeout(None)?;

    ctx.service
        .plugin
        .serve(channel, remote, &session, ctx.config)?;

    Ok(())
}

/// TERMINATE: remove the session if the presented capability carries the
/// TERM right. A missing session is a silent no-op so that repeated
/// terminations do not leak whether a session ever existed.
pub fn handle_termination(
    channel: &mut Channel,
    remote: &SignPublicKey,
    sessions: &SessionStore,
) -> Result<(), ServerError> {
    let termination: SessionTermination = channel.read_typed()?;

    let Ok(session) = sessions.find(termination.identifier) else {
        return Ok(());
    };

    let presented = Capability::from_message(&termination.cap);
    presented.verify(&session.cap, remote, Rights::TERM)?;

    let _ = sessions.remove(termination.identifier);

    Ok(())
}
