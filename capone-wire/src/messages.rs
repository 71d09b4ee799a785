//! The Capone protocol messages.
//!
//! Every message is a boxed record: a 32-bit constructor ID followed by its
//! fields. The IDs make a received buffer self-describing, so a peer that
//! sends the wrong message at a protocol step fails deserialization instead
//! of producing garbage fields.

use crate::deserialize::{self, Buffer, Deserializable};
use crate::serialize::Serializable;
use crate::Identifiable;

/// Reads and checks the constructor ID of `M`.
fn expect_id<M: Identifiable>(buf: Buffer) -> deserialize::Result<()> {
    let id = u32::deserialize(buf)?;
    if id != M::CONSTRUCTOR_ID {
        return Err(deserialize::Error::UnexpectedConstructor { id });
    }
    Ok(())
}

// ─── Command ─────────────────────────────────────────────────────────────────

/// The verb a client announces right after the handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Ask for the service description.
    Query     = 0,
    /// Start a previously requested session.
    Connect   = 1,
    /// Request a new session.
    Request   = 2,
    /// Kill a session without running it.
    Terminate = 3,
}

impl Command {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Query),
            1 => Some(Self::Connect),
            2 => Some(Self::Request),
            3 => Some(Self::Terminate),
            _ => None,
        }
    }
}

/// First message on every command connection: which verb follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    /// The requested command.
    pub command: Command,
}

impl Identifiable for CommandEnvelope {
    const CONSTRUCTOR_ID: u32 = 0x1b4d_02a7;
}

impl Serializable for CommandEnvelope {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        (self.command as u32).serialize(buf);
    }
}

impl Deserializable for CommandEnvelope {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        expect_id::<Self>(buf)?;
        let command = Command::from_u32(u32::deserialize(buf)?)
            .ok_or(deserialize::Error::InvalidValue)?;
        Ok(Self { command })
    }
}

// ─── Handshake ───────────────────────────────────────────────────────────────

/// One side's contribution to the encryption handshake.
///
/// The ephemeral agreement key is signed by the long-term identity so a
/// man-in-the-middle cannot substitute its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionKeyMessage {
    /// Long-term signing public key (the sender's identity).
    pub sign_pk:    [u8; 32],
    /// Fresh ephemeral agreement public key.
    pub encrypt_pk: [u8; 32],
    /// Detached signature over `encrypt_pk` by `sign_pk`.
    pub signature:  [u8; 64],
}

impl Identifiable for SessionKeyMessage {
    const CONSTRUCTOR_ID: u32 = 0x83f9_61ce;
}

impl Serializable for SessionKeyMessage {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.sign_pk.serialize(buf);
        self.encrypt_pk.serialize(buf);
        self.signature.serialize(buf);
    }
}

impl Deserializable for SessionKeyMessage {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        expect_id::<Self>(buf)?;
        Ok(Self {
            sign_pk:    <[u8; 32]>::deserialize(buf)?,
            encrypt_pk: <[u8; 32]>::deserialize(buf)?,
            signature:  <[u8; 64]>::deserialize(buf)?,
        })
    }
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// Answer to a QUERY: what the service is and where it lives.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceDescription {
    /// Human-readable service name from the configuration.
    pub name:     String,
    /// Broad category, e.g. `"Shell"`.
    pub category: String,
    /// Plugin type identifier, e.g. `"exec"`.
    pub kind:     String,
    /// Plugin version.
    pub version:  String,
    /// Physical location hint from the configuration.
    pub location: String,
    /// Port the service listens on.
    pub port:     String,
}

impl Identifiable for ServiceDescription {
    const CONSTRUCTOR_ID: u32 = 0x2fd8_a5b1;
}

impl Serializable for ServiceDescription {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.name.serialize(buf);
        self.category.serialize(buf);
        self.kind.serialize(buf);
        self.version.serialize(buf);
        self.location.serialize(buf);
        self.port.serialize(buf);
    }
}

impl Deserializable for ServiceDescription {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        expect_id::<Self>(buf)?;
        Ok(Self {
            name:     String::deserialize(buf)?,
            category: String::deserialize(buf)?,
            kind:     String::deserialize(buf)?,
            version:  String::deserialize(buf)?,
            location: String::deserialize(buf)?,
            port:     String::deserialize(buf)?,
        })
    }
}

// ─── Capabilities ────────────────────────────────────────────────────────────

/// One delegation step in a capability chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityEntry {
    /// The principal the rights were delegated to.
    pub identity: [u8; 32],
    /// Rights bitmask delegated at this step.
    pub rights:   u32,
}

impl Serializable for CapabilityEntry {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.identity.serialize(buf);
        self.rights.serialize(buf);
    }
}

impl Deserializable for CapabilityEntry {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        Ok(Self {
            identity: <[u8; 32]>::deserialize(buf)?,
            rights:   u32::deserialize(buf)?,
        })
    }
}

/// Wire form of a capability: the secret plus its delegation chain.
///
/// No hashing happens at this layer; verification against a root is the
/// receiver's duty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityMessage {
    /// The 32-byte capability secret.
    pub secret: [u8; 32],
    /// Delegations from the (server-held) root to the holder.
    pub chain:  Vec<CapabilityEntry>,
}

impl Identifiable for CapabilityMessage {
    const CONSTRUCTOR_ID: u32 = 0x60c1_77e4;
}

impl Serializable for CapabilityMessage {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.secret.serialize(buf);
        self.chain.serialize(buf);
    }
}

impl Deserializable for CapabilityMessage {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        expect_id::<Self>(buf)?;
        Ok(Self {
            secret: <[u8; 32]>::deserialize(buf)?,
            chain:  Vec::<CapabilityEntry>::deserialize(buf)?,
        })
    }
}

// ─── Session lifecycle ───────────────────────────────────────────────────────

/// Body of a REQUEST: service-specific parameters, opaque to the core.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionRequest {
    /// Serialized parameter message, decoded by the service plugin.
    pub parameters: Vec<u8>,
}

impl Identifiable for SessionRequest {
    const CONSTRUCTOR_ID: u32 = 0x74b2_9c0d;
}

impl Serializable for SessionRequest {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.parameters.serialize(buf);
    }
}

impl Deserializable for SessionRequest {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        expect_id::<Self>(buf)?;
        Ok(Self { parameters: Vec::<u8>::deserialize(buf)? })
    }
}

/// Answer to a REQUEST: the session handle plus a capability for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionAnnouncement {
    /// Public session identifier.
    pub identifier: u32,
    /// Capability granting EXEC and TERM to the requester.
    pub cap:        CapabilityMessage,
}

impl Identifiable for SessionAnnouncement {
    const CONSTRUCTOR_ID: u32 = 0x9a53_08f2;
}

impl Serializable for SessionAnnouncement {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.identifier.serialize(buf);
        self.cap.serialize(buf);
    }
}

impl Deserializable for SessionAnnouncement {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        expect_id::<Self>(buf)?;
        Ok(Self {
            identifier: u32::deserialize(buf)?,
            cap:        CapabilityMessage::deserialize(buf)?,
        })
    }
}

/// Body of a CONNECT: which session to start, proven by a capability.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionStart {
    /// Identifier returned by the earlier REQUEST.
    pub identifier: u32,
    /// Capability carrying the EXEC right.
    pub cap:        CapabilityMessage,
}

impl Identifiable for SessionStart {
    const CONSTRUCTOR_ID: u32 = 0xc07e_413a;
}

impl Serializable for SessionStart {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.identifier.serialize(buf);
        self.cap.serialize(buf);
    }
}

impl Deserializable for SessionStart {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        expect_id::<Self>(buf)?;
        Ok(Self {
            identifier: u32::deserialize(buf)?,
            cap:        CapabilityMessage::deserialize(buf)?,
        })
    }
}

/// Generic outcome notification. `result == 0` means success.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionResult {
    /// Zero on success, a nonzero error code otherwise.
    pub result: i32,
}

impl Identifiable for SessionResult {
    const CONSTRUCTOR_ID: u32 = 0x45aa_d60b;
}

impl Serializable for SessionResult {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.result.serialize(buf);
    }
}

impl Deserializable for SessionResult {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        expect_id::<Self>(buf)?;
        Ok(Self { result: i32::deserialize(buf)? })
    }
}

/// Body of a TERMINATE: which session to kill, proven by a capability.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionTermination {
    /// Identifier of the session to remove.
    pub identifier: u32,
    /// Capability carrying the TERM right.
    pub cap:        CapabilityMessage,
}

impl Identifiable for SessionTermination {
    const CONSTRUCTOR_ID: u32 = 0xe8d4_5f19;
}

impl Serializable for SessionTermination {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.identifier.serialize(buf);
        self.cap.serialize(buf);
    }
}

impl Deserializable for SessionTermination {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        expect_id::<Self>(buf)?;
        Ok(Self {
            identifier: u32::deserialize(buf)?,
            cap:        CapabilityMessage::deserialize(buf)?,
        })
    }
}

// ─── Service parameters ──────────────────────────────────────────────────────

/// Parameters of the built-in `exec` service.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecParams {
    /// Program to run.
    pub command:   String,
    /// Arguments passed to the program.
    pub arguments: Vec<String>,
}

impl Identifiable for ExecParams {
    const CONSTRUCTOR_ID: u32 = 0x3d90_bb6c;
}

impl Serializable for ExecParams {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.command.serialize(buf);
        self.arguments.serialize(buf);
    }
}

impl Deserializable for ExecParams {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        expect_id::<Self>(buf)?;
        Ok(Self {
            command:   String::deserialize(buf)?,
            arguments: Vec::<String>::deserialize(buf)?,
        })
    }
}
