//! # vtsync Server
//!
//! Reference in-memory pub/sub server for vtsync.
//!
//! This crate provides:
//! - Handlers for every request kind (publish, subscribe, unsubscribe,
//!   ACLs, advance, fetch)
//! - An in-memory value log with a global clock
//! - CBOR byte handling for in-process transports
//!
//! # Architecture
//!
//! Every publish appends a revision stamped with the next value of a single
//! server clock. Clients reconcile with two requests:
//! 1. Advance: which revisions of a key exist after my confirmed clock?
//! 2. Fetch: send me exactly these revisions
//!
//! Advance and fetch on a pattern key answer across every matching key.
//! Advance answers are capped at `max_advance_batch`; a capped answer's
//! `max` is its last revision so the client picks up from there.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod value_log;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, PublishRequest, RequestHandler};
pub use value_log::{Append, ValueLog};
pub use server::SyncServer;
