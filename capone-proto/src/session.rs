//! The registry of live sessions.
//!
//! REQUEST creates a session, CONNECT or TERMINATE consumes it. The store is
//! shared by every connection handler and guarded by a single mutex; the
//! critical sections are plain map operations. Handles are reference
//! counted, so a handler still holding a session it looked up is unaffected
//! by a concurrent remove.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::{Arc, Mutex};

use capone_crypto::SignPublicKey;

use crate::caps::{Capability, CapabilityError};

// ─── Session ─────────────────────────────────────────────────────────────────

/// One requested-but-not-yet-consumed service session.
#[derive(Debug, PartialEq)]
pub struct Session {
    /// Public handle, unique among live sessions.
    pub identifier: u32,
    /// Service-specific parameters, opaque to the core.
    pub parameters: Vec<u8>,
    /// Identity that issued the REQUEST.
    pub creator:    SignPublicKey,
    /// Root capability; delegations of it authorize CONNECT and TERMINATE.
    pub cap:        Capability,
}

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors from session store operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionError {
    /// No live session with the given identifier.
    NotFound,
    /// Creating the root capability failed.
    Capability(CapabilityError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound      => write!(f, "session not found"),
            Self::Capability(e) => write!(f, "could not create session capability: {e}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<CapabilityError> for SessionError {
    fn from(e: CapabilityError) -> Self { Self::Capability(e) }
}

// ─── SessionStore ────────────────────────────────────────────────────────────

/// Mutex-guarded map of live sessions, keyed by identifier.
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<u32, Arc<Session>>>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session for `creator` and return a handle to it.
    ///
    /// Allocates a random identifier not currently in use and a fresh root
    /// capability.
    pub fn add(
        &self,
        parameters: Vec<u8>,
        creator: SignPublicKey,
    ) -> Result<Arc<Session>, SessionError> {
        let cap = Capability::root()?;

        let mut sessions = self.inner.lock().expect("session store lock poisoned");
        loop {
            let mut bytes = [0u8; 4];
            getrandom::getrandom(&mut bytes)
                .map_err(|_| SessionError::Capability(CapabilityError::RandomnessFailed))?;
            let identifier = u32::from_le_bytes(bytes);

            match sessions.entry(identifier) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let session = Arc::new(Session {
                        identifier,
                        parameters,
                        creator,
                        cap,
                    });
                    slot.insert(Arc::clone(&session));
                    log::debug!("created session {identifier}");
                    return Ok(session);
                }
            }
        }
    }

    /// Remove a session, returning it. The removal is the linearization
    /// point for one-shot consumption: exactly one caller wins.
    pub fn remove(&self, identifier: u32) -> Result<Arc<Session>, SessionError> {
        let mut sessions = self.inner.lock().expect("session store lock poisoned");
        sessions.remove(&identifier).ok_or(SessionError::NotFound)
    }

    /// Look up a session without removing it.
    pub fn find(&self, identifier: u32) -> Result<Arc<Session>, SessionError> {
        let sessions = self.inner.lock().expect("session store lock poisoned");
        sessions.get(&identifier).cloned().ok_or(SessionError::NotFound)
    }

    /// Drop all sessions. Used at teardown.
    pub fn clear(&self) {
        let mut sessions = self.inner.lock().expect("session store lock poisoned");
        sessions.clear();
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("session store lock poisoned").len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use capone_crypto::SignKeyPair;

    use super::*;

    fn creator() -> SignPublicKey {
        *SignKeyPair::generate().unwrap().public()
    }

    #[test]
    fn add_then_remove_returns_the_same_session() {
        let store = SessionStore::new();
        let creator = creator();

        let session = store.add(b"params".to_vec(), creator).unwrap();
        let removed = store.remove(session.identifier).unwrap();

        assert_eq!(removed.identifier, session.identifier);
        assert_eq!(removed.creator, creator);
        assert_eq!(removed.parameters, b"params");
        assert!(store.is_empty());
    }

    #[test]
    fn find_does_not_consume() {
        let store = SessionStore::new();
        let session = store.add(Vec::new(), creator()).unwrap();

        assert!(store.find(session.identifier).is_ok());
        assert!(store.find(session.identifier).is_ok());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_is_one_shot() {
        let store = SessionStore::new();
        let session = store.add(Vec::new(), creator()).unwrap();

        assert!(store.remove(session.identifier).is_ok());
        assert_eq!(store.remove(session.identifier), Err(SessionError::NotFound));
    }

    #[test]
    fn identifiers_are_unique_among_live_sessions() {
        let store = SessionStore::new();
        let creator = creator();

        let mut identifiers = std::collections::HashSet::new();
        for _ in 0..64 {
            let session = store.add(Vec::new(), creator).unwrap();
            assert!(identifiers.insert(session.identifier));
        }
    }

    #[test]
    fn sessions_get_distinct_root_capabilities() {
        let store = SessionStore::new();
        let a = store.add(Vec::new(), creator()).unwrap();
        let b = store.add(Vec::new(), creator()).unwrap();
        assert_ne!(a.cap, b.cap);
    }

    #[test]
    fn clear_empties_the_store() {
        let store = SessionStore::new();
        for _ in 0..8 {
            store.add(Vec::new(), creator()).unwrap();
        }
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn handle_survives_concurrent_remove() {
        let store = SessionStore::new();
        let session = store.add(b"kept".to_vec(), creator()).unwrap();
        let handle = store.find(session.identifier).unwrap();
        store.remove(session.identifier).unwrap();
        assert_eq!(handle.parameters, b"kept");
    }
}
