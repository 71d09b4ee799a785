//! Capabilities: chained, append-only delegations of rights over a session.
//!
//! A *root* capability is 32 random bytes held by the server. Delegating
//! appends a `(principal, rights)` entry and replaces the secret with
//! `H(principal ‖ rights ‖ secret)`, so a holder can weaken a capability and
//! pass it on but can never widen it: verification recomputes the chain from
//! the root and compares secrets.

use std::fmt;
use std::str::FromStr;

use capone_crypto::{SignPublicKey, hash32};
use capone_wire::messages::{CapabilityEntry, CapabilityMessage};

/// Length of a capability secret in bytes.
pub const SECRET_LEN: usize = 32;

// ─── Rights ──────────────────────────────────────────────────────────────────

/// A bitmask of rights over a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rights(u32);

impl Rights {
    /// No rights at all. Never valid in a chain entry.
    pub const NONE: Rights = Rights(0);
    /// Permission to CONNECT to the session.
    pub const EXEC: Rights = Rights(1 << 0);
    /// Permission to TERMINATE the session.
    pub const TERM: Rights = Rights(1 << 1);
    /// Both known rights; what a root implicitly grants.
    pub const ALL: Rights = Rights(Self::EXEC.0 | Self::TERM.0);

    /// Reconstruct from raw wire bits. Unknown bits are preserved so that
    /// verification can reject them against the known-rights ceiling.
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw bitmask.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is present in `self`.
    pub fn contains(self, other: Rights) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no bits are set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Parse the compact letter form: `x` grants EXEC, `t` grants TERM.
    ///
    /// Empty strings, unknown letters and duplicate letters are rejected.
    pub fn from_letters(letters: &str) -> Result<Self, CapabilityError> {
        let mut rights = Self::NONE;
        for letter in letters.chars() {
            let right = match letter {
                'x' => Self::EXEC,
                't' => Self::TERM,
                _   => return Err(CapabilityError::InvalidRights),
            };
            if rights.contains(right) {
                return Err(CapabilityError::InvalidRights);
            }
            rights = rights | right;
        }
        if rights.is_empty() {
            return Err(CapabilityError::InvalidRights);
        }
        Ok(rights)
    }

    /// The compact letter form, e.g. `"xt"`.
    pub fn to_letters(self) -> String {
        let mut letters = String::new();
        if self.contains(Self::EXEC) {
            letters.push('x');
        }
        if self.contains(Self::TERM) {
            letters.push('t');
        }
        letters
    }
}

impl std::ops::BitOr for Rights {
    type Output = Rights;

    fn bitor(self, rhs: Rights) -> Rights {
        Rights(self.0 | rhs.0)
    }
}

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors from constructing, parsing or verifying capabilities.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CapabilityError {
    /// A delegation tried to grant rights its parent does not hold.
    Escalation,
    /// Verification failed. Carries no detail on purpose: the peer must not
    /// learn whether the principal, the rights or the secret was wrong.
    Unauthorized,
    /// A textual secret was not 64 hex characters.
    InvalidSecret,
    /// A textual chain entry was malformed.
    InvalidChainEntry,
    /// A rights string was empty, unknown or escalating.
    InvalidRights,
    /// The system randomness source failed.
    RandomnessFailed,
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Escalation        => write!(f, "delegation grants rights the parent does not hold"),
            Self::Unauthorized      => write!(f, "capability verification failed"),
            Self::InvalidSecret     => write!(f, "capability secret is not 64 hex characters"),
            Self::InvalidChainEntry => write!(f, "malformed capability chain entry"),
            Self::InvalidRights     => write!(f, "invalid rights specification"),
            Self::RandomnessFailed  => write!(f, "system randomness source failed"),
        }
    }
}

impl std::error::Error for CapabilityError {}

// ─── Delegation chain ────────────────────────────────────────────────────────

/// One step of a delegation chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delegation {
    /// The principal the rights were delegated to.
    pub principal: SignPublicKey,
    /// Rights granted at this step; a subset of the previous step's.
    pub rights:    Rights,
}

/// A capability: a secret plus the delegations that produced it.
///
/// An empty chain marks a *root* capability, the server-held seed that is
/// never transmitted. Delegated capabilities are *references* presented by
/// clients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capability {
    secret: [u8; SECRET_LEN],
    chain:  Vec<Delegation>,
}

fn chain_hash(principal: &SignPublicKey, rights: Rights, secret: &[u8; SECRET_LEN]) -> [u8; SECRET_LEN] {
    // Fixed input layout: identity ‖ rights (network byte order) ‖ secret.
    hash32(&[&principal.0, &rights.bits().to_be_bytes(), secret])
}

impl Capability {
    /// Create a fresh root capability with a random secret.
    pub fn root() -> Result<Self, CapabilityError> {
        let mut secret = [0u8; SECRET_LEN];
        getrandom::getrandom(&mut secret).map_err(|_| CapabilityError::RandomnessFailed)?;
        Ok(Self { secret, chain: Vec::new() })
    }

    /// Delegate `rights` to `principal`.
    ///
    /// Fails if this capability already has a chain and `rights` is not a
    /// subset of its last entry.
    pub fn create_ref(
        &self,
        rights: Rights,
        principal: &SignPublicKey,
    ) -> Result<Self, CapabilityError> {
        if let Some(last) = self.chain.last() {
            if !last.rights.contains(rights) {
                return Err(CapabilityError::Escalation);
            }
        }

        let mut chain = self.chain.clone();
        chain.push(Delegation { principal: *principal, rights });

        Ok(Self {
            secret: chain_hash(principal, rights, &self.secret),
            chain,
        })
    }

    /// Verify this reference against a root capability.
    ///
    /// `presenter` must be the principal of the final delegation, the chain
    /// must descend monotonically from the full rights of the root, the
    /// recomputed secret must match, and `required` must survive to the end
    /// of the chain.
    pub fn verify(
        &self,
        root: &Capability,
        presenter: &SignPublicKey,
        required: Rights,
    ) -> Result<(), CapabilityError> {
        let Some(last) = self.chain.last() else {
            return Err(CapabilityError::Unauthorized);
        };
        if last.principal != *presenter {
            return Err(CapabilityError::Unauthorized);
        }
        if !last.rights.contains(required) {
            return Err(CapabilityError::Unauthorized);
        }

        let mut secret = root.secret;
        let mut allowed = Rights::ALL;
        for delegation in &self.chain {
            if !allowed.contains(delegation.rights) {
                return Err(CapabilityError::Unauthorized);
            }
            secret = chain_hash(&delegation.principal, delegation.rights, &secret);
            allowed = delegation.rights;
        }

        if !allowed.contains(required) {
            return Err(CapabilityError::Unauthorized);
        }
        if secret != self.secret {
            return Err(CapabilityError::Unauthorized);
        }

        Ok(())
    }

    /// Whether this is a root capability (empty chain).
    pub fn is_root(&self) -> bool {
        self.chain.is_empty()
    }

    /// The delegation chain, root end first.
    pub fn chain(&self) -> &[Delegation] {
        &self.chain
    }

    /// Convert to the wire representation.
    pub fn to_message(&self) -> CapabilityMessage {
        CapabilityMessage {
            secret: self.secret,
            chain:  self.chain.iter()
                .map(|d| CapabilityEntry {
                    identity: d.principal.0,
                    rights:   d.rights.bits(),
                })
                .collect(),
        }
    }

    /// Reconstruct from the wire representation.
    ///
    /// Only shape is checked here; whether the chain is honest is decided by
    /// [`Capability::verify`] against a root.
    pub fn from_message(message: &CapabilityMessage) -> Self {
        Self {
            secret: message.secret,
            chain:  message.chain.iter()
                .map(|e| Delegation {
                    principal: SignPublicKey(e.identity),
                    rights:    Rights::from_bits(e.rights),
                })
                .collect(),
        }
    }
}

// ─── Text form ───────────────────────────────────────────────────────────────

/// `hex(secret)` followed by `|hex(principal):letters` per delegation.
impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.secret))?;
        for delegation in &self.chain {
            write!(f, "|{}:{}", delegation.principal.to_hex(), delegation.rights.to_letters())?;
        }
        Ok(())
    }
}

impl FromStr for Capability {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = s.split('|');

        let secret_hex = segments.next().unwrap_or("");
        if secret_hex.len() != SECRET_LEN * 2 {
            return Err(CapabilityError::InvalidSecret);
        }
        let mut secret = [0u8; SECRET_LEN];
        hex::decode_to_slice(secret_hex, &mut secret)
            .map_err(|_| CapabilityError::InvalidSecret)?;

        let mut chain = Vec::new();
        let mut allowed = Rights::ALL;
        for segment in segments {
            let (identity_hex, letters) = segment
                .split_once(':')
                .ok_or(CapabilityError::InvalidChainEntry)?;
            let principal = SignPublicKey::from_hex(identity_hex)
                .map_err(|_| CapabilityError::InvalidChainEntry)?;
            let rights = Rights::from_letters(letters)?;

            if !allowed.contains(rights) {
                return Err(CapabilityError::InvalidRights);
            }
            allowed = rights;

            chain.push(Delegation { principal, rights });
        }

        Ok(Self { secret, chain })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
