//! Wire message types and binary serialization for the Capone protocol.
//!
//! # Overview
//!
//! | Module          | Contents                                              |
//! |-----------------|-------------------------------------------------------|
//! | [`serialize`]   | [`Serializable`] trait + primitive impls              |
//! | [`deserialize`] | [`Deserializable`] trait, [`Cursor`], error type      |
//! | [`messages`]    | The protocol messages exchanged between peers         |
//!
//! Messages are flat records with a 32-bit constructor ID header; see
//! [`messages`] for the encoding rules. The framing that carries these
//! records over a socket lives in `capone-proto`, not here.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod deserialize;
pub mod messages;
pub mod serialize;

pub use deserialize::{Cursor, Deserializable};
pub use serialize::Serializable;

/// Every message type has a unique 32-bit constructor ID.
pub trait Identifiable {
    /// The constructor ID written as the first field on the wire.
    const CONSTRUCTOR_ID: u32;
}
