//! Queues that run operations.

use crate::operation::Operation;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Accepts operations and runs them.
///
/// Operations are started independently and may run in parallel. Per-key
/// ordering of the reconciliation loop comes from each step scheduling the
/// next one from its own completion, not from the queue.
pub trait OperationQueue: Send + Sync {
    /// Starts an operation as soon as possible.
    fn add_operation(&self, operation: Arc<Operation>);

    /// Starts an operation after `delay`.
    fn add_operation_after(&self, operation: Arc<Operation>, delay: Duration);
}

/// Runs every operation on its own tokio task.
#[derive(Clone)]
pub struct TokioOperationQueue {
    handle: Handle,
}

impl TokioOperationQueue {
    /// Creates a queue on the current runtime.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        Self {
            handle: Handle::current(),
        }
    }
}

impl Default for TokioOperationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationQueue for TokioOperationQueue {
    fn add_operation(&self, operation: Arc<Operation>) {
        self.handle.spawn(async move {
            start(&operation);
        });
    }

    fn add_operation_after(&self, operation: Arc<Operation>, delay: Duration) {
        debug!(op = operation.id(), kind = operation.name(), ?delay, "operation deferred");
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            start(&operation);
        });
    }
}

fn start(operation: &Arc<Operation>) {
    if let Err(e) = operation.start() {
        warn!(op = operation.id(), kind = operation.name(), error = %e, "queued operation not started");
    }
}

/// An operation accepted by a [`ManualQueue`].
pub struct QueuedOperation {
    /// The operation.
    pub operation: Arc<Operation>,
    /// Requested start delay.
    pub delay: Duration,
}

/// A queue that only records operations, leaving it to the caller to start
/// them. Useful for driving the engine step by step in tests.
#[derive(Default)]
pub struct ManualQueue {
    queued: Mutex<Vec<QueuedOperation>>,
}

impl ManualQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything queued so far.
    pub fn take(&self) -> Vec<QueuedOperation> {
        std::mem::take(&mut *self.queued.lock())
    }

    /// Returns the number of queued operations.
    pub fn len(&self) -> usize {
        self.queued.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queued.lock().is_empty()
    }

    /// Starts every queued operation, returning how many were started.
    pub fn run_pending(&self) -> usize {
        let queued = self.take();
        let count = queued.len();
        for entry in queued {
            start(&entry.operation);
        }
        count
    }
}

impl OperationQueue for ManualQueue {
    fn add_operation(&self, operation: Arc<Operation>) {
        self.add_operation_after(operation, Duration::ZERO);
    }

    fn add_operation_after(&self, operation: Arc<Operation>, delay: Duration) {
        self.queued.lock().push(QueuedOperation { operation, delay });
    }
}
