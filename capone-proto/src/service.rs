//! Service plugins and their binding to configuration.
//!
//! The core never interprets service parameters: REQUEST carries them as
//! opaque bytes, the plugin's own parameter message round-trips them. A
//! plugin supplies both halves of a service: `serve` runs on the server
//! after a successful CONNECT, `invoke` drives the client end.

pub mod exec;

use std::fmt;

use capone_crypto::SignPublicKey;
use capone_wire::messages::ServiceDescription;

use crate::channel::{Channel, ChannelError};
use crate::config::{Config, ServiceConfig};
use crate::session::Session;

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors raised by service plugins.
#[derive(Debug)]
pub enum ServiceError {
    /// No plugin registered for the configured type.
    UnknownType(String),
    /// The parameter bytes did not decode as the plugin's message.
    InvalidParameters,
    /// The plugin's invocation arguments were unusable.
    InvalidArguments(String),
    /// Channel I/O failed while the plugin was running.
    Channel(ChannelError),
    /// Spawning or driving the service's process failed.
    Io(std::io::Error),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownType(kind)    => write!(f, "unknown service type '{kind}'"),
            Self::InvalidParameters    => write!(f, "service parameters failed to decode"),
            Self::InvalidArguments(m)  => write!(f, "invalid service arguments: {m}"),
            Self::Channel(e)           => write!(f, "service channel error: {e}"),
            Self::Io(e)                => write!(f, "service I/O error: {e}"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<ChannelError> for ServiceError {
    fn from(e: ChannelError) -> Self { Self::Channel(e) }
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self { Self::Io(e) }
}

// ─── ServicePlugin ───────────────────────────────────────────────────────────

/// The behavior a service type contributes to the core.
pub trait ServicePlugin: Send + Sync {
    /// Broad category shown in query answers, e.g. `"Shell"`.
    fn category(&self) -> &'static str;

    /// Type identifier used in configuration, e.g. `"exec"`.
    fn kind(&self) -> &'static str;

    /// Plugin version shown in query answers.
    fn version(&self) -> &'static str;

    /// Parse client-side invocation arguments into serialized parameters.
    fn parse_params(&self, args: &[String]) -> Result<Vec<u8>, ServiceError>;

    /// Check that raw parameter bytes decode as this plugin's message.
    fn decode_params(&self, raw: &[u8]) -> Result<(), ServiceError>;

    /// Run the server half on a consumed session. Takes channel ownership;
    /// the connection ends when this returns.
    fn serve(
        &self,
        channel: Channel,
        invoker: &SignPublicKey,
        session: &Session,
        config: &Config,
    ) -> Result<(), ServiceError>;

    /// Run the client half after a successful session start.
    fn invoke(
        &self,
        channel: Channel,
        args: &[String],
        config: &Config,
    ) -> Result<(), ServiceError>;
}

/// Look up the built-in plugin for a configured service type.
pub fn plugin_by_kind(kind: &str) -> Result<Box<dyn ServicePlugin>, ServiceError> {
    match kind {
        "exec" => Ok(Box::new(exec::ExecService)),
        _      => Err(ServiceError::UnknownType(kind.to_owned())),
    }
}

// ─── Service ─────────────────────────────────────────────────────────────────

/// A plugin bound to one `[[service]]` configuration section.
pub struct Service {
    /// Display name from the configuration.
    pub name:     String,
    /// Port this service listens on.
    pub port:     u16,
    /// Location hint from the configuration.
    pub location: String,
    /// The behavior implementation.
    pub plugin:   Box<dyn ServicePlugin>,
}

impl Service {
    /// Bind the configured type to its plugin.
    pub fn from_config(section: &ServiceConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            name:     section.name.clone(),
            port:     section.port,
            location: section.location.clone(),
            plugin:   plugin_by_kind(&section.kind)?,
        })
    }

    /// The description sent in answer to a QUERY.
    pub fn describe(&self) -> ServiceDescription {
        ServiceDescription {
            name:     self.name.clone(),
            category: self.plugin.category().to_owned(),
            kind:     self.plugin.kind().to_owned(),
            version:  self.plugin.version().to_owned(),
            location: self.location.clone(),
            port:     self.port.to_string(),
        }
    }
}
