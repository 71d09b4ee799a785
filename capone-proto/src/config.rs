//! Server and client configuration.
//!
//! ```toml
//! [core]
//! name       = "Living room server"
//! public_key = "dd7df3…"
//! secret_key = "ecb7b7…"
//!
//! [[service]]
//! name     = "White noise"
//! type     = "exec"
//! port     = 43217
//! location = "Living room"
//! ```

use std::fmt;
use std::io;
use std::path::Path;

use capone_crypto::{KeyError, SignKeyPair};
use serde::Deserialize;

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors from loading configuration. All fatal at startup.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io(io::Error),
    /// The file is not valid TOML or misses required keys.
    Parse(toml::de::Error),
    /// The configured key material is unusable.
    Key(KeyError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e)    => write!(f, "could not read configuration: {e}"),
            Self::Parse(e) => write!(f, "could not parse configuration: {e}"),
            Self::Key(e)   => write!(f, "invalid key in configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self { Self::Parse(e) }
}

impl From<KeyError> for ConfigError {
    fn from(e: KeyError) -> Self { Self::Key(e) }
}

// ─── Config ──────────────────────────────────────────────────────────────────

/// The `[core]` section: identity of this host.
#[derive(Clone, Debug, Deserialize)]
pub struct CoreConfig {
    /// Display name announced to clients.
    pub name:       String,
    /// Hex-encoded long-term signing public key.
    pub public_key: String,
    /// Hex-encoded long-term signing secret key.
    pub secret_key: String,
}

/// One `[[service]]` section: a service exposed on its own port.
#[derive(Clone, Debug, Deserialize)]
pub struct ServiceConfig {
    /// Display name of this service instance.
    pub name:     String,
    /// Plugin type, e.g. `"exec"`.
    #[serde(rename = "type")]
    pub kind:     String,
    /// TCP port the service listens on.
    pub port:     u16,
    /// Free-form location hint.
    #[serde(default)]
    pub location: String,
}

/// Parsed configuration file.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The host identity.
    pub core:     CoreConfig,
    /// Exposed services; may be empty for pure clients.
    #[serde(default, rename = "service")]
    pub services: Vec<ServiceConfig>,
}

impl Config {
    /// Load and parse a configuration file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_str_contents(&contents)
    }

    /// Parse configuration from a string.
    pub fn from_str_contents(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Reconstruct the long-term signing key pair from the `[core]` section.
    pub fn sign_keys(&self) -> Result<SignKeyPair, ConfigError> {
        Ok(SignKeyPair::from_hex(&self.core.public_key, &self.core.secret_key)?)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
