//! Application context shared by every operation.

use crate::callback::CallbackQueue;
use crate::config::ClientConfig;
use crate::listener::ListenerRegistry;
use crate::operation::Operation;
use crate::queue::OperationQueue;
use crate::stats::SyncStats;
use crate::store::RevisionStore;
use crate::transport::Transport;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use vtsync_protocol::{AclSet, Key, ValueRecord, Vts};

/// State and collaborators shared by the operations of one client.
///
/// The confirmed-clock table, ACL cache, latest-value cache and listener
/// registry are only mutated from operation completion paths and the client
/// facade. Each map sits behind its own lock, so unrelated keys can be
/// updated concurrently.
pub struct ClientContext {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    store: Arc<dyn RevisionStore>,
    queue: Arc<dyn OperationQueue>,
    callbacks: CallbackQueue,
    listeners: ListenerRegistry,
    rvts: RwLock<HashMap<Key, Vts>>,
    acls: RwLock<AclSet>,
    latest: RwLock<HashMap<Key, ValueRecord>>,
    stats: RwLock<SyncStats>,
    /// Keys with a running advance/fetch loop.
    loops: Mutex<HashSet<Key>>,
    /// Operations with a request in flight, for reconnect resends.
    outstanding: Mutex<HashMap<u64, Arc<Operation>>>,
    next_operation_id: AtomicU64,
}

impl ClientContext {
    /// Creates a context.
    ///
    /// Must be called from within a tokio runtime, which hosts the callback
    /// queue.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn RevisionStore>,
        queue: Arc<dyn OperationQueue>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            transport,
            store,
            queue,
            callbacks: CallbackQueue::new(),
            listeners: ListenerRegistry::new(),
            rvts: RwLock::new(HashMap::new()),
            acls: RwLock::new(AclSet::new()),
            latest: RwLock::new(HashMap::new()),
            stats: RwLock::new(SyncStats::default()),
            loops: Mutex::new(HashSet::new()),
            outstanding: Mutex::new(HashMap::new()),
            next_operation_id: AtomicU64::new(1),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the transport.
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Returns the local revision store.
    pub fn store(&self) -> &dyn RevisionStore {
        self.store.as_ref()
    }

    /// Returns the callback queue.
    pub fn callbacks(&self) -> &CallbackQueue {
        &self.callbacks
    }

    /// Returns the listener registry.
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Returns true if a listener is registered for exactly `key`.
    pub fn has_listener(&self, key: &Key) -> bool {
        self.listeners.has_listener(key)
    }

    /// Enqueues an operation.
    pub fn add_operation(&self, operation: Arc<Operation>) {
        self.queue.add_operation(operation);
    }

    /// Enqueues an operation to start after `delay`.
    pub fn add_operation_after(&self, operation: Arc<Operation>, delay: Duration) {
        self.queue.add_operation_after(operation, delay);
    }

    pub(crate) fn next_operation_id(&self) -> u64 {
        self.next_operation_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the last confirmed clock for `key`, or zero.
    pub fn confirmed_vts(&self, key: &Key) -> Vts {
        self.rvts.read().get(key).copied().unwrap_or(Vts::ZERO)
    }

    /// Commits a confirmed clock for `key` and returns the stored value.
    ///
    /// With a monotonic clock configured, an older value never replaces a
    /// newer one.
    pub fn commit_rvts(&self, key: &Key, vts: Vts) -> Vts {
        let stored = {
            let mut rvts = self.rvts.write();
            let entry = rvts.entry(key.clone()).or_insert(Vts::ZERO);
            let current = *entry;
            if self.config.monotonic_clock && vts < current {
                debug!(%key, %current, rejected = %vts, "clock regression ignored");
            } else {
                *entry = vts;
            }
            *entry
        };
        self.record(|s| s.clock_commits += 1);
        stored
    }

    /// Returns the cached ACL set.
    pub fn acls(&self) -> AclSet {
        self.acls.read().clone()
    }

    /// Replaces the cached ACL set.
    pub fn replace_acls(&self, acls: AclSet) {
        debug!(count = acls.len(), "acl cache replaced");
        *self.acls.write() = acls;
    }

    /// Returns the latest known value for a concrete key.
    pub fn latest_value(&self, key: &Key) -> Option<ValueRecord> {
        self.latest.read().get(key).cloned()
    }

    /// Caches `value` if it is newer than the cached value for its key.
    ///
    /// Returns true if the cache changed.
    pub fn update_latest(&self, value: &ValueRecord) -> bool {
        let mut latest = self.latest.write();
        match latest.get(&value.key) {
            Some(cached) if cached.vts >= value.vts => false,
            _ => {
                latest.insert(value.key.clone(), value.clone());
                true
            }
        }
    }

    /// Hands a value to every listener matching its key, on the callback queue.
    pub(crate) fn deliver(&self, value: ValueRecord) {
        let listeners = self.listeners.listeners_for(&value.key);
        if listeners.is_empty() {
            return;
        }
        self.record(|s| s.values_delivered += 1);
        self.callbacks.dispatch(move || {
            for listener in listeners {
                listener(&value);
            }
        });
    }

    /// Marks the reconciliation loop for `key` as running.
    ///
    /// Returns false if a loop is already running.
    pub(crate) fn try_begin_loop(&self, key: &Key) -> bool {
        self.loops.lock().insert(key.clone())
    }

    /// Decides whether the loop for `key` continues, ending it otherwise.
    pub(crate) fn continue_loop(&self, key: &Key) -> bool {
        let mut loops = self.loops.lock();
        if self.listeners.has_listener(key) {
            loops.insert(key.clone());
            true
        } else {
            loops.remove(key);
            false
        }
    }

    /// Ends the loop for `key` without checking for listeners.
    pub(crate) fn end_loop(&self, key: &Key) {
        self.loops.lock().remove(key);
    }

    /// Returns true if a reconciliation loop is running for `key`.
    pub fn is_looping(&self, key: &Key) -> bool {
        self.loops.lock().contains(key)
    }

    pub(crate) fn register_outstanding(&self, operation: &Arc<Operation>) {
        self.outstanding
            .lock()
            .entry(operation.id())
            .or_insert_with(|| Arc::clone(operation));
    }

    pub(crate) fn remove_outstanding(&self, id: u64) {
        self.outstanding.lock().remove(&id);
    }

    /// Returns the number of operations waiting for a response.
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.lock().len()
    }

    /// Resends every outstanding request. Called by the transport when the
    /// connection is (re)established.
    pub fn handle_connect(&self) {
        let operations: Vec<Arc<Operation>> = self.outstanding.lock().values().cloned().collect();
        debug!(count = operations.len(), "connected, resending outstanding requests");
        for operation in operations {
            operation.handle_connect();
        }
    }

    /// Returns a snapshot of the statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    pub(crate) fn record(&self, update: impl FnOnce(&mut SyncStats)) {
        update(&mut self.stats.write());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ManualQueue;
    use crate::store::MemoryRevisionStore;
    use crate::transport::MockTransport;

    fn context(config: ClientConfig) -> Arc<ClientContext> {
        ClientContext::new(
            config,
            Arc::new(MockTransport::new()),
            Arc::new(MemoryRevisionStore::new()),
            Arc::new(ManualQueue::new()),
        )
    }

    #[tokio::test]
    async fn clock_defaults_to_zero() {
        let ctx = context(ClientConfig::default());
        assert_eq!(ctx.confirmed_vts(&Key::new("room/5")), Vts::ZERO);
    }

    #[tokio::test]
    async fn monotonic_commits() {
        let ctx = context(ClientConfig::default());
        let key = Key::new("room/5");
        assert_eq!(ctx.commit_rvts(&key, Vts::new(7)), Vts::new(7));
        assert_eq!(ctx.commit_rvts(&key, Vts::new(3)), Vts::new(7));
        assert_eq!(ctx.confirmed_vts(&key), Vts::new(7));
        assert_eq!(ctx.stats().clock_commits, 2);
    }

    #[tokio::test]
    async fn overwriting_commits() {
        let ctx = context(ClientConfig::default().with_monotonic_clock(false));
        let key = Key::new("room/5");
        ctx.commit_rvts(&key, Vts::new(7));
        assert_eq!(ctx.commit_rvts(&key, Vts::new(3)), Vts::new(3));
    }

    #[tokio::test]
    async fn latest_cache_only_moves_forward() {
        let ctx = context(ClientConfig::default());
        let key = Key::new("room/5");
        let v2 = ValueRecord::put(key.clone(), Vts::new(2), b"two".to_vec(), 0);
        let v1 = ValueRecord::put(key.clone(), Vts::new(1), b"one".to_vec(), 0);

        assert!(ctx.update_latest(&v2));
        assert!(!ctx.update_latest(&v2));
        assert!(!ctx.update_latest(&v1));
        assert_eq!(ctx.latest_value(&key), Some(v2));
    }

    #[tokio::test]
    async fn values_without_listeners_are_not_counted() {
        let ctx = context(ClientConfig::default());
        let value = ValueRecord::put(Key::new("room/5"), Vts::new(1), b"one".to_vec(), 0);

        ctx.deliver(value.clone());
        assert_eq!(ctx.stats().values_delivered, 0);

        ctx.listeners()
            .add(Key::new("room/*"), Arc::new(|_: &ValueRecord| {}));
        ctx.deliver(value);
        assert_eq!(ctx.stats().values_delivered, 1);
    }

    #[tokio::test]
    async fn loop_tracking_follows_listeners() {
        let ctx = context(ClientConfig::default());
        let key = Key::new("room/5");

        assert!(ctx.try_begin_loop(&key));
        assert!(!ctx.try_begin_loop(&key));

        // No listener: the loop ends.
        assert!(!ctx.continue_loop(&key));
        assert!(!ctx.is_looping(&key));

        ctx.listeners().add(key.clone(), Arc::new(|_: &ValueRecord| {}));
        assert!(ctx.continue_loop(&key));
        assert!(ctx.is_looping(&key));
    }
}
