//! Access control lists gating QUERY and REQUEST.
//!
//! ACLs are loaded once at startup and read-only afterwards; no locking is
//! needed. CONNECT and TERMINATE are gated by capability verification
//! instead and never consult an ACL.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use std::collections::HashMap;

use capone_crypto::{KeyError, SignPublicKey};

use crate::caps::Rights;

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors from loading an ACL file.
#[derive(Debug)]
pub enum AclError {
    /// The file could not be read.
    Io(io::Error),
    /// A line was not a valid hex signing key.
    InvalidKey {
        /// 1-based line number of the offending entry.
        line: usize,
        /// The underlying parse failure.
        source: KeyError,
    },
}

impl fmt::Display for AclError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "could not read ACL file: {e}"),
            Self::InvalidKey { line, source } => {
                write!(f, "invalid key on ACL line {line}: {source}")
            }
        }
    }
}

impl std::error::Error for AclError {}

impl From<io::Error> for AclError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

// ─── Acl ─────────────────────────────────────────────────────────────────────

/// A set of `(identity, rights)` entries plus an optional wildcard.
#[derive(Debug, Default)]
pub struct Acl {
    entries:  HashMap<SignPublicKey, Rights>,
    wildcard: Rights,
}

impl Acl {
    /// An ACL that denies everyone.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `rights` to a specific identity.
    pub fn allow(&mut self, key: SignPublicKey, rights: Rights) {
        let entry = self.entries.entry(key).or_insert(Rights::NONE);
        *entry = *entry | rights;
    }

    /// Grant `rights` to every identity.
    pub fn allow_all(&mut self, rights: Rights) {
        self.wildcard = self.wildcard | rights;
    }

    /// Whether `key` holds every bit of `right`.
    pub fn is_allowed(&self, key: &SignPublicKey, right: Rights) -> bool {
        if self.wildcard.contains(right) {
            return true;
        }
        self.entries
            .get(key)
            .is_some_and(|rights| rights.contains(right))
    }

    /// Load an ACL from a file with one hex signing key per line.
    ///
    /// Every listed key is granted `rights`; blank lines are ignored.
    pub fn from_file(path: &Path, rights: Rights) -> Result<Self, AclError> {
        let mut acl = Self::new();
        let contents = fs::read_to_string(path)?;

        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let key = SignPublicKey::from_hex(line)
                .map_err(|source| AclError::InvalidKey { line: index + 1, source })?;
            acl.allow(key, rights);
        }

        Ok(acl)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
