//! Cancellable, single-shot asynchronous operations.
//!
//! An [`Operation`] owns at most one request and one timeout timer and moves
//! through `Initial → Executing → Finished` exactly once. What the request
//! is and how its response is interpreted is decided by the
//! [`OperationKind`]; the state machine here is shared by every kind.
//!
//! ## Sending and retrying
//!
//! Sending arms a timeout (60 seconds by default) and hands the request to
//! the transport. Whichever fires first, the timeout or the transport's
//! completion, drives the operation forward:
//! - a completion cancels the timeout, processes the response and finishes
//! - a timeout while connected resends the same request
//! - a timeout while disconnected does nothing; the reconnect notification
//!   ([`Operation::handle_connect`]) resends instead
//!
//! There is no retry limit at this layer. Responses arriving after the
//! operation has been claimed for finishing are dropped.

mod acls;
mod advance;
mod fetch;
mod publish;
mod subscribe;

pub use acls::GetAclsOp;
pub use advance::AdvanceOp;
pub use fetch::FetchOp;
pub use publish::{PublishHandler, PublishOp};
pub use subscribe::SubscribeOp;

use crate::context::ClientContext;
use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};
use vtsync_protocol::{Key, Request, Response};

/// Lifecycle state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationState {
    /// Created, not started.
    Initial,
    /// Started; a request may be in flight.
    Executing,
    /// Done. The operation is inert.
    Finished,
}

impl OperationState {
    /// Returns the ordinal of the state.
    pub fn ordinal(self) -> u8 {
        match self {
            OperationState::Initial => 0,
            OperationState::Executing => 1,
            OperationState::Finished => 2,
        }
    }

    /// Validates a transition, which must strictly increase the ordinal.
    pub fn transition(self, to: OperationState) -> SyncResult<OperationState> {
        if to.ordinal() <= self.ordinal() {
            return Err(SyncError::InvalidStateTransition {
                from: self.to_string(),
                to: to.to_string(),
            });
        }
        Ok(to)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationState::Initial => "initial",
            OperationState::Executing => "executing",
            OperationState::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// The closed set of operation kinds.
pub enum OperationKind {
    /// Publish or delete a value.
    Publish(PublishOp),
    /// Subscribe to or unsubscribe from a key.
    Subscribe(SubscribeOp),
    /// Refresh the ACL cache.
    GetAcls(GetAclsOp),
    /// Ask for revisions after the confirmed clock.
    Advance(AdvanceOp),
    /// Fetch missing revisions.
    Fetch(FetchOp),
}

impl OperationKind {
    /// Returns a short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Publish(_) => "publish",
            OperationKind::Subscribe(_) => "subscribe",
            OperationKind::GetAcls(_) => "get-acls",
            OperationKind::Advance(_) => "advance",
            OperationKind::Fetch(_) => "fetch",
        }
    }

    /// Returns the key the operation works on, if any.
    pub fn key(&self) -> Option<&Key> {
        match self {
            OperationKind::Publish(op) => Some(op.key()),
            OperationKind::Subscribe(op) => Some(op.key()),
            OperationKind::GetAcls(_) => None,
            OperationKind::Advance(op) => Some(op.key()),
            OperationKind::Fetch(op) => Some(op.key()),
        }
    }

    /// Builds the request. `Ok(None)` means no round trip is needed.
    fn build_request(&mut self, ctx: &ClientContext) -> SyncResult<Option<Request>> {
        match self {
            OperationKind::Publish(op) => op.build_request(),
            OperationKind::Subscribe(op) => op.build_request(),
            OperationKind::GetAcls(op) => op.build_request(),
            OperationKind::Advance(op) => op.build_request(ctx),
            OperationKind::Fetch(op) => op.build_request(),
        }
    }

    /// Interprets a response whose kind matches the request.
    fn handle_response(&mut self, ctx: &Arc<ClientContext>, response: Response) -> SyncResult<()> {
        match self {
            OperationKind::Publish(_) | OperationKind::Subscribe(_) => Ok(()),
            OperationKind::GetAcls(op) => op.handle_response(ctx, response),
            OperationKind::Advance(op) => op.handle_response(ctx, response),
            OperationKind::Fetch(op) => op.handle_response(ctx, response),
        }
    }

    /// Runs the kind's completion behaviour.
    fn on_finish(&mut self, ctx: &Arc<ClientContext>, error: Option<&SyncError>) {
        match self {
            OperationKind::Publish(op) => op.on_finish(ctx, error),
            OperationKind::Subscribe(_) | OperationKind::GetAcls(_) => {}
            OperationKind::Advance(op) => op.on_finish(ctx, error),
            OperationKind::Fetch(op) => op.on_finish(ctx, error),
        }
    }
}

/// A unit of client-server work.
pub struct Operation {
    id: u64,
    name: &'static str,
    context: Arc<ClientContext>,
    kind: Mutex<OperationKind>,
    state: watch::Sender<OperationState>,
    cancelled: AtomicBool,
    /// Set by whichever path claims the right to finish.
    finishing: AtomicBool,
    /// Held while a send registers the operation and while finishing
    /// unregisters it.
    sending: Mutex<()>,
    error: Mutex<Option<SyncError>>,
    request: Mutex<Option<Request>>,
    timeout: Mutex<Option<JoinHandle<()>>>,
}

impl Operation {
    /// Creates an operation in the `Initial` state.
    pub fn new(context: Arc<ClientContext>, kind: impl Into<OperationKind>) -> Arc<Self> {
        let kind = kind.into();
        let (state, _) = watch::channel(OperationState::Initial);
        Arc::new(Self {
            id: context.next_operation_id(),
            name: kind.name(),
            context,
            kind: Mutex::new(kind),
            state,
            cancelled: AtomicBool::new(false),
            finishing: AtomicBool::new(false),
            sending: Mutex::new(()),
            error: Mutex::new(None),
            request: Mutex::new(None),
            timeout: Mutex::new(None),
        })
    }

    /// Returns the operation id, unique per context.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the kind name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the key the operation works on, if any.
    pub fn key(&self) -> Option<Key> {
        self.kind.lock().key().cloned()
    }

    /// Returns the current state.
    pub fn state(&self) -> OperationState {
        *self.state.borrow()
    }

    /// Returns true while the operation is executing.
    pub fn is_executing(&self) -> bool {
        self.state() == OperationState::Executing
    }

    /// Returns true once the operation has finished.
    pub fn is_finished(&self) -> bool {
        self.state() == OperationState::Finished
    }

    /// Returns a receiver notified on every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<OperationState> {
        self.state.subscribe()
    }

    /// Waits until the operation has finished.
    pub async fn wait_finished(&self) {
        let mut receiver = self.state.subscribe();
        let _ = receiver
            .wait_for(|state| *state == OperationState::Finished)
            .await;
    }

    /// Requests cancellation.
    ///
    /// The operation finishes with [`SyncError::Cancelled`] at its next
    /// decision point. A request already handed to the transport is not
    /// aborted; if its response arrives first, it is still processed.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the recorded error.
    pub fn error(&self) -> Option<SyncError> {
        self.error.lock().clone()
    }

    /// Returns the built request.
    pub fn request(&self) -> Option<Request> {
        self.request.lock().clone()
    }

    /// Runs `f` with the operation's kind.
    pub fn with_kind<R>(&self, f: impl FnOnce(&OperationKind) -> R) -> R {
        f(&self.kind.lock())
    }

    /// Starts the operation.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidStateTransition`] if the operation was
    /// already started.
    pub fn start(self: &Arc<Self>) -> SyncResult<()> {
        if self.state() != OperationState::Initial {
            return Err(SyncError::InvalidStateTransition {
                from: self.state().to_string(),
                to: OperationState::Executing.to_string(),
            });
        }
        self.context.record(|s| s.operations_started += 1);

        if self.is_cancelled() {
            self.finish_with_error(SyncError::Cancelled);
            return Ok(());
        }

        self.set_state(OperationState::Executing)?;
        debug!(op = self.id, kind = self.name, "operation started");

        let built = self.kind.lock().build_request(&self.context);
        match built {
            Ok(Some(request)) => {
                *self.request.lock() = Some(request);
                self.send();
            }
            Ok(None) => self.finish(),
            Err(e) => self.finish_with_error(e),
        }
        Ok(())
    }

    /// Sends (or resends) the request.
    ///
    /// Returns true if the request was handed to the transport.
    pub(crate) fn send(self: &Arc<Self>) -> bool {
        if self.finishing.load(Ordering::SeqCst) {
            trace!(op = self.id, "send skipped, operation is finishing");
            return false;
        }
        if self.is_cancelled() {
            self.finish_with_error(SyncError::Cancelled);
            return false;
        }

        let request = {
            let _sending = self.sending.lock();
            // Re-checked under the lock `finish_claimed` takes to unregister.
            if self.finishing.load(Ordering::SeqCst) {
                trace!(op = self.id, "send skipped, operation is finishing");
                return false;
            }
            let Some(request) = self.request() else {
                return false;
            };
            self.arm_timeout();
            self.context.register_outstanding(self);
            request
        };
        self.context.record(|s| s.requests_sent += 1);
        trace!(op = self.id, kind = %request.kind(), "request sent");

        let operation = Arc::clone(self);
        self.context
            .transport()
            .send(request, Box::new(move |result| operation.complete(result)));
        true
    }

    /// Resends immediately after the transport (re)connects.
    pub fn handle_connect(self: &Arc<Self>) {
        if !self.is_executing() || self.finishing.load(Ordering::SeqCst) {
            return;
        }
        debug!(op = self.id, kind = self.name, "resending after connect");
        if self.send() {
            self.context.record(|s| s.reconnect_resends += 1);
        }
    }

    /// Finishes the operation, unless another path already did.
    pub(crate) fn finish(self: &Arc<Self>) {
        if self.claim_finish() {
            self.finish_claimed();
        }
    }

    fn finish_with_error(self: &Arc<Self>, error: SyncError) {
        if self.claim_finish() {
            self.set_error(error);
            self.finish_claimed();
        }
    }

    fn claim_finish(&self) -> bool {
        !self.finishing.swap(true, Ordering::SeqCst)
    }

    fn finish_claimed(self: &Arc<Self>) {
        {
            let _sending = self.sending.lock();
            self.cancel_timeout();
            self.context.remove_outstanding(self.id);
        }

        let error = self.error();
        match &error {
            Some(SyncError::Cancelled) => debug!(op = self.id, kind = self.name, "operation cancelled"),
            Some(e) => {
                warn!(op = self.id, kind = self.name, error = %e, "operation failed");
                self.context.record(|s| s.operations_failed += 1);
            }
            None => debug!(op = self.id, kind = self.name, "operation finished"),
        }

        self.kind.lock().on_finish(&self.context, error.as_ref());

        if let Err(e) = self.set_state(OperationState::Finished) {
            error!(op = self.id, error = %e, "operation finished twice");
        }
        self.context.record(|s| s.operations_finished += 1);
    }

    /// Handles the transport's completion.
    fn complete(self: &Arc<Self>, result: SyncResult<Response>) {
        if !self.claim_finish() {
            self.context.record(|s| s.late_responses += 1);
            trace!(op = self.id, "late response dropped");
            return;
        }
        self.cancel_timeout();
        self.process_response(result);
        self.finish_claimed();
    }

    fn process_response(self: &Arc<Self>, result: SyncResult<Response>) {
        let Some(expected) = self.request.lock().as_ref().map(Request::kind) else {
            return;
        };

        let outcome = match result {
            Err(e) => Err(e),
            Ok(response) if response.kind() != expected => {
                Err(SyncError::unexpected_response(expected, response.kind()))
            }
            Ok(Response::Error { message, .. }) => Err(SyncError::Server(message)),
            Ok(response) => self.kind.lock().handle_response(&self.context, response),
        };

        if let Err(e) = outcome {
            self.set_error(e);
        }
    }

    fn set_error(&self, error: SyncError) {
        *self.error.lock() = Some(error);
    }

    fn set_state(&self, to: OperationState) -> SyncResult<()> {
        let mut result = Ok(());
        self.state.send_if_modified(|state| match state.transition(to) {
            Ok(next) => {
                *state = next;
                true
            }
            Err(e) => {
                result = Err(e);
                false
            }
        });
        result
    }

    fn arm_timeout(self: &Arc<Self>) {
        let Ok(handle) = Handle::try_current() else {
            warn!(op = self.id, "no runtime, request timeout disabled");
            return;
        };

        let operation = Arc::downgrade(self);
        let timeout = self.context.config().request_timeout;
        let task = handle.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(operation) = operation.upgrade() {
                operation.on_timeout();
            }
        });

        if let Some(previous) = self.timeout.lock().replace(task) {
            previous.abort();
        }
    }

    fn cancel_timeout(&self) {
        if let Some(task) = self.timeout.lock().take() {
            task.abort();
        }
    }

    fn on_timeout(self: &Arc<Self>) {
        // Detach the handle of the running timer so a resend does not abort it.
        self.timeout.lock().take();

        if self.context.transport().is_connected() {
            debug!(op = self.id, kind = self.name, "request timed out, resending");
            if self.send() {
                self.context.record(|s| s.timeout_resends += 1);
            }
        } else {
            debug!(op = self.id, kind = self.name, "request timed out while disconnected");
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("kind", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Fails with the key's validation error, if any.
fn validate_key(key: &Key) -> SyncResult<()> {
    match key.error() {
        Some(e) => Err(SyncError::InvalidKey(e.clone())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod harness;

#[cfg(test)]
mod tests {
    use super::harness::Harness;
    use super::*;
    use crate::config::ClientConfig;
    use std::time::Duration;
    use vtsync_protocol::AclSet;

    #[test]
    fn transitions_only_move_forward() {
        let initial = OperationState::Initial;
        assert_eq!(
            initial.transition(OperationState::Executing),
            Ok(OperationState::Executing)
        );
        assert_eq!(
            initial.transition(OperationState::Finished),
            Ok(OperationState::Finished)
        );
        assert!(OperationState::Executing
            .transition(OperationState::Executing)
            .is_err());
        assert!(matches!(
            OperationState::Finished.transition(OperationState::Initial),
            Err(SyncError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let h = Harness::new();
        let op = h.run(GetAclsOp::new());
        assert!(op.is_executing());

        assert!(matches!(
            op.start(),
            Err(SyncError::InvalidStateTransition { .. })
        ));
        assert_eq!(h.transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn state_changes_are_observable() {
        let h = Harness::new();
        let op = Operation::new(Arc::clone(&h.ctx), GetAclsOp::new());
        let mut states = op.subscribe_state();
        assert_eq!(*states.borrow_and_update(), OperationState::Initial);

        op.start().unwrap();
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), OperationState::Executing);

        h.transport.respond_next(Response::Acls {
            acls: Some(AclSet::new()),
        });
        op.wait_finished().await;
        assert_eq!(op.state(), OperationState::Finished);
        assert_eq!(h.ctx.outstanding_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_resends_while_connected() {
        let h = Harness::new();
        let op = h.run(GetAclsOp::new());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(h.transport.sent_count(), 2);
        assert_eq!(h.ctx.stats().timeout_resends, 1);
        assert_eq!(h.transport.sent_requests()[0], h.transport.sent_requests()[1]);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.transport.sent_count(), 3);
        assert!(op.is_executing());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_waits_for_reconnect_while_disconnected() {
        let h = Harness::with_config(
            ClientConfig::default().with_request_timeout(Duration::from_secs(10)),
        );
        let op = h.run(GetAclsOp::new());
        h.transport.set_connected(false);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.transport.sent_count(), 1);
        assert!(op.is_executing());

        h.transport.set_connected(true);
        h.ctx.handle_connect();
        assert_eq!(h.transport.sent_count(), 2);
        assert_eq!(h.ctx.stats().reconnect_resends, 1);

        // The resend re-arms the timer.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(h.transport.sent_count(), 3);
    }

    #[tokio::test]
    async fn response_cancels_timeout() {
        let h = Harness::new();
        h.transport.script_response(Response::Acls {
            acls: Some(AclSet::new()),
        });
        let op = h.run(GetAclsOp::new());

        assert!(op.is_finished());
        assert!(op.timeout.lock().is_none());
    }

    #[tokio::test]
    async fn response_after_cancel_is_still_processed() {
        let h = Harness::new();
        let op = h.run(GetAclsOp::new());
        op.cancel();

        h.transport.respond_next(Response::Acls {
            acls: Some(AclSet::new()),
        });
        assert!(op.is_finished());
        assert!(op.error().is_none());
    }

    #[tokio::test]
    async fn cancel_takes_effect_on_resend() {
        let h = Harness::new();
        let op = h.run(GetAclsOp::new());
        op.cancel();

        h.ctx.handle_connect();
        assert!(op.is_finished());
        assert_eq!(op.error(), Some(SyncError::Cancelled));
        assert_eq!(h.transport.sent_count(), 1);
        assert_eq!(h.ctx.stats().reconnect_resends, 0);

        // The held request's response arrives after the cancel finished it.
        h.transport.respond_next(Response::Acls {
            acls: Some(AclSet::new()),
        });
        assert_eq!(h.ctx.stats().late_responses, 1);
        assert_eq!(op.error(), Some(SyncError::Cancelled));
    }

    #[tokio::test]
    async fn stale_send_after_finish_registers_nothing() {
        let h = Harness::new();
        let op = h.run(GetAclsOp::new());
        h.transport.respond_next(Response::Acls {
            acls: Some(AclSet::new()),
        });
        assert!(op.is_finished());

        assert!(!op.send());
        assert_eq!(h.ctx.outstanding_count(), 0);
        assert!(op.timeout.lock().is_none());
        assert_eq!(h.transport.sent_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn resends_racing_a_completion_leave_nothing_outstanding() {
        for _ in 0..100 {
            let h = Harness::new();
            let op = h.run(GetAclsOp::new());

            let resender = {
                let op = Arc::clone(&op);
                tokio::task::spawn_blocking(move || {
                    for _ in 0..20 {
                        op.handle_connect();
                    }
                })
            };
            assert!(h.transport.respond_next(Response::Acls {
                acls: Some(AclSet::new()),
            }));
            resender.await.unwrap();

            assert!(op.is_finished());
            assert_eq!(h.ctx.outstanding_count(), 0);
            assert!(op.timeout.lock().is_none());
        }
    }

    #[tokio::test]
    async fn transport_error_is_recorded() {
        let h = Harness::new();
        let op = h.run(GetAclsOp::new());

        h.transport
            .fail_next(SyncError::transport_fatal("connection reset"));
        assert!(op.is_finished());
        assert!(matches!(op.error(), Some(SyncError::Transport { .. })));
        assert_eq!(h.ctx.stats().operations_failed, 1);
    }

    #[tokio::test]
    async fn handle_connect_ignores_idle_operations() {
        let h = Harness::new();
        let op = Operation::new(Arc::clone(&h.ctx), GetAclsOp::new());
        op.handle_connect();
        assert_eq!(h.transport.sent_count(), 0);
        assert_eq!(op.state(), OperationState::Initial);
    }
}
