//! Application-facing client.

use crate::config::ClientConfig;
use crate::context::ClientContext;
use crate::error::{SyncError, SyncResult};
use crate::listener::{ListenerId, ValueListener};
use crate::operation::{
    AdvanceOp, GetAclsOp, Operation, OperationKind, PublishHandler, PublishOp, SubscribeOp,
};
use crate::queue::TokioOperationQueue;
use crate::stats::SyncStats;
use crate::store::RevisionStore;
use crate::transport::Transport;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;
use vtsync_protocol::{AclId, AclSet, Key, ValueRecord, Vts};

/// A listener registration returned by [`Client::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    id: ListenerId,
    key: Key,
}

impl Subscription {
    /// Returns the subscribed key.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Returns the listener id.
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

/// Publishes values, manages subscriptions and exposes the synced state.
///
/// Every method enqueues operations and returns without waiting; the `_async`
/// variants wait for the server's acknowledgement.
#[derive(Clone)]
pub struct Client {
    ctx: Arc<ClientContext>,
}

impl Client {
    /// Creates a client over an existing context.
    pub fn new(ctx: Arc<ClientContext>) -> Self {
        Self { ctx }
    }

    /// Creates a client running its operations on the current tokio runtime.
    pub fn connect(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn RevisionStore>,
    ) -> Self {
        let queue = Arc::new(TokioOperationQueue::new());
        Self::new(ClientContext::new(config, transport, store, queue))
    }

    /// Returns the context.
    pub fn context(&self) -> &Arc<ClientContext> {
        &self.ctx
    }

    /// Publishes `data` under `key`.
    pub fn publish(
        &self,
        key: Key,
        data: Vec<u8>,
        acl: Option<AclId>,
        handler: Option<PublishHandler>,
    ) -> Arc<Operation> {
        let mut op = PublishOp::new(key, data);
        if let Some(acl) = acl {
            op = op.with_acl(acl);
        }
        if let Some(handler) = handler {
            op = op.with_handler(handler);
        }
        self.enqueue(op)
    }

    /// Publishes `data` under `key` and waits for the outcome.
    pub async fn publish_async(&self, key: Key, data: Vec<u8>, acl: Option<AclId>) -> SyncResult<()> {
        let (tx, rx) = oneshot::channel();
        self.publish(key, data, acl, Some(completion_sender(tx)));
        await_completion(rx).await
    }

    /// Deletes `key`, or every key matching a pattern.
    pub fn delete(&self, key: Key, handler: Option<PublishHandler>) -> Arc<Operation> {
        let mut op = PublishOp::delete(key);
        if let Some(handler) = handler {
            op = op.with_handler(handler);
        }
        self.enqueue(op)
    }

    /// Deletes `key` and waits for the outcome.
    pub async fn delete_async(&self, key: Key) -> SyncResult<()> {
        let (tx, rx) = oneshot::channel();
        self.delete(key, Some(completion_sender(tx)));
        await_completion(rx).await
    }

    /// Registers `listener` for values under `key`, which may be a pattern.
    ///
    /// The first listener for a key subscribes on the server and starts the
    /// reconciliation loop.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidKey`] for a malformed key.
    pub fn subscribe(&self, key: Key, listener: ValueListener) -> SyncResult<Subscription> {
        if let Some(e) = key.error() {
            return Err(SyncError::InvalidKey(e.clone()));
        }

        let first = !self.ctx.has_listener(&key);
        let id = self.ctx.listeners().add(key.clone(), listener);
        debug!(%key, first, "listener added");

        if first {
            self.enqueue(SubscribeOp::subscribe(key.clone()));
        }
        if self.ctx.try_begin_loop(&key) {
            self.enqueue(AdvanceOp::new(key.clone()));
        }
        Ok(Subscription { id, key })
    }

    /// Removes a listener. Removing the last listener for a key unsubscribes
    /// on the server; the loop stops at its next step.
    pub fn unsubscribe(&self, subscription: Subscription) {
        let Some(key) = self.ctx.listeners().remove(subscription.id) else {
            return;
        };
        if !self.ctx.has_listener(&key) {
            debug!(%key, "last listener removed");
            self.enqueue(SubscribeOp::unsubscribe(key));
        }
    }

    /// Refreshes the ACL cache.
    pub fn refresh_acls(&self) -> Arc<Operation> {
        self.enqueue(GetAclsOp::new())
    }

    /// Returns the cached ACL set.
    pub fn acls(&self) -> AclSet {
        self.ctx.acls()
    }

    /// Resends every outstanding request after a reconnect.
    pub fn handle_connect(&self) {
        self.ctx.handle_connect();
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> SyncStats {
        self.ctx.stats()
    }

    /// Returns the latest known value for a concrete key.
    pub fn latest_value(&self, key: &Key) -> Option<ValueRecord> {
        self.ctx.latest_value(key)
    }

    /// Returns the confirmed clock for a key.
    pub fn confirmed_vts(&self, key: &Key) -> Vts {
        self.ctx.confirmed_vts(key)
    }

    fn enqueue(&self, kind: impl Into<OperationKind>) -> Arc<Operation> {
        let op = Operation::new(Arc::clone(&self.ctx), kind);
        self.ctx.add_operation(Arc::clone(&op));
        op
    }
}

fn completion_sender(tx: oneshot::Sender<Option<SyncError>>) -> PublishHandler {
    Box::new(move |_, error| {
        let _ = tx.send(error);
    })
}

async fn await_completion(rx: oneshot::Receiver<Option<SyncError>>) -> SyncResult<()> {
    match rx.await {
        Ok(None) => Ok(()),
        Ok(Some(e)) => Err(e),
        Err(_) => Err(SyncError::Cancelled),
    }
}
