//! The Capone core: encrypted channels, handshake, capabilities, sessions,
//! and the four-verb protocol engine.
//!
//! # Overview
//!
//! | Module        | Contents                                                  |
//! |---------------|-----------------------------------------------------------|
//! | [`channel`]   | Block-framed message I/O with optional AEAD per block     |
//! | [`handshake`] | Mutual authentication + symmetric key agreement           |
//! | [`caps`]      | Hash-chained capability delegation and verification       |
//! | [`session`]   | The process-wide registry of live sessions                |
//! | [`acl`]       | Identity-based gates for QUERY and REQUEST                |
//! | [`server`]    | Command dispatch for accepted connections                 |
//! | [`client`]    | The mirrored client-side exchanges                        |
//! | [`service`]   | Service plugin trait and the built-in `exec` plugin       |
//! | [`config`]    | TOML configuration (`[core]` identity, `[[service]]`s)    |
//!
//! A typical session lifecycle: the client opens a [`channel::Channel`],
//! [`handshake::initiate`] encrypts it, REQUEST creates a session and hands
//! back a capability, CONNECT consumes the capability to start the service,
//! or TERMINATE kills the session instead.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod acl;
pub mod caps;
pub mod channel;
pub mod client;
pub mod config;
pub mod handshake;
pub mod server;
pub mod service;
pub mod session;

pub use acl::Acl;
pub use capone_wire::messages::Command;
pub use caps::{Capability, Rights};
pub use channel::{Channel, ChannelError, ChannelType, Listener, Side};
pub use config::Config;
pub use service::{Service, ServicePlugin};
pub use session::{Session, SessionStore};
