//! # vtsync Protocol
//!
//! Pub/sub key-value protocol types and CBOR codecs for vtsync.
//!
//! This crate provides:
//! - `Key` for validated pub/sub identifiers (with wildcard patterns)
//! - `Vts`, the per-key logical clock
//! - `ValueRecord` and the ACL types carried by the protocol
//! - Protocol messages (`Request`, `Response`)
//! - CBOR encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod acl;
mod error;
mod key;
mod messages;
mod value;
mod vts;

pub use acl::{Acl, AclId, AclSet};
pub use error::{KeyError, ProtocolError, ProtocolResult};
pub use key::{Key, MAX_KEY_LENGTH, MULTI_WILDCARD, SEGMENT_SEPARATOR, SINGLE_WILDCARD};
pub use messages::{Request, RequestKind, Response};
pub use value::ValueRecord;
pub use vts::Vts;
