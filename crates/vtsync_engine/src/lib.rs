//! # vtsync Engine
//!
//! Client-side operation state machine and reconciliation loop.
//!
//! This crate provides:
//! - Cancellable single-shot operations with timeout-driven resends
//! - Publish, subscribe, ACL refresh, advance and fetch operations
//! - The per-key advance/fetch loop that keeps subscriptions in sync
//! - Transport, revision store and queue abstractions
//! - A client facade and an in-process loopback transport
//!
//! ## Architecture
//!
//! Every round trip is an [`Operation`]. Its [`OperationKind`] builds the
//! request and interprets the response; the shared state machine handles
//! sending, timeouts, reconnect resends, cancellation and finishing.
//!
//! Keeping a subscription current is a loop of operations:
//! 1. An advance asks for the revisions after the key's confirmed clock
//! 2. Revisions not in the local store are fetched in one request
//! 3. The confirmed clock moves forward once the values are delivered
//! 4. The next advance runs immediately after a fetch, or after the poll
//!    interval when there was nothing to fetch
//!
//! The loop stops at its next step once the key has no listener.
//!
//! ## Key Invariants
//!
//! - An operation finishes exactly once, and its state never moves backward
//! - A resend always sends the same request
//! - Values reach listeners in fetch order, each at most once per key clock
//! - A key has at most one loop step in flight

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod callback;
mod client;
mod config;
mod context;
mod error;
mod listener;
mod loopback;
mod operation;
mod queue;
mod stats;
mod store;
mod transport;

pub use callback::CallbackQueue;
pub use client::{Client, Subscription};
pub use config::{ClientConfig, DEFAULT_ADVANCE_INTERVAL, DEFAULT_REQUEST_TIMEOUT};
pub use context::ClientContext;
pub use error::{StoreError, SyncError, SyncResult};
pub use listener::{ListenerId, ListenerRegistry, ValueListener};
pub use loopback::{LoopbackServer, LoopbackTransport};
pub use operation::{
    AdvanceOp, FetchOp, GetAclsOp, Operation, OperationKind, OperationState, PublishHandler,
    PublishOp, SubscribeOp,
};
pub use queue::{ManualQueue, OperationQueue, QueuedOperation, TokioOperationQueue};
pub use stats::SyncStats;
pub use store::{MemoryRevisionStore, RevisionStore};
pub use transport::{Completion, MockTransport, Transport};
