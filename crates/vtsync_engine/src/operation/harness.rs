//! Shared fixture for operation tests.

use super::{Operation, OperationKind};
use crate::config::ClientConfig;
use crate::context::ClientContext;
use crate::queue::ManualQueue;
use crate::store::MemoryRevisionStore;
use crate::transport::MockTransport;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use vtsync_protocol::{Key, ValueRecord};

pub(crate) struct Harness {
    pub ctx: Arc<ClientContext>,
    pub transport: Arc<MockTransport>,
    pub store: Arc<MemoryRevisionStore>,
    pub queue: Arc<ManualQueue>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryRevisionStore::new());
        let queue = Arc::new(ManualQueue::new());
        let ctx = ClientContext::new(config, transport.clone(), store.clone(), queue.clone());
        Self {
            ctx,
            transport,
            store,
            queue,
        }
    }

    /// Creates and starts an operation.
    pub fn run(&self, kind: impl Into<OperationKind>) -> Arc<Operation> {
        let op = Operation::new(Arc::clone(&self.ctx), kind);
        op.start().unwrap();
        op
    }

    /// Registers a listener that forwards every delivered value.
    pub fn listen(&self, key: &Key) -> mpsc::UnboundedReceiver<ValueRecord> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.ctx.listeners().add(
            key.clone(),
            Arc::new(move |value: &ValueRecord| {
                let _ = tx.send(value.clone());
            }),
        );
        rx
    }

    /// Waits until every callback dispatched so far has run.
    pub async fn flush_callbacks(&self) {
        let (tx, rx) = oneshot::channel();
        self.ctx.callbacks().dispatch(move || {
            let _ = tx.send(());
        });
        rx.await.unwrap();
    }
}
