//! Asking the server what changed since the confirmed clock.
//!
//! `AdvanceOp` and [`FetchOp`](super::FetchOp) form the reconciliation loop
//! for a key:
//!
//! 1. Advance sends the key's confirmed clock and receives the revisions
//!    after it.
//! 2. Revisions already in the local store are discounted.
//! 3. Nothing missing: the clock is committed directly and the next advance
//!    runs after the poll interval.
//! 4. Something missing: a fetch for exactly those revisions is enqueued,
//!    carrying the clock to commit once it completes. The fetch, not this
//!    advance, schedules the next advance.
//!
//! Each step schedules the next one only from its own completion, so a key
//! never has two loop steps in flight.

use super::{validate_key, FetchOp, Operation, OperationKind};
use crate::context::ClientContext;
use crate::error::{SyncError, SyncResult};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use vtsync_protocol::{Key, Request, RequestKind, Response, Vts};

/// One advance step of the reconciliation loop.
pub struct AdvanceOp {
    key: Key,
    since: Vts,
    fetch_scheduled: bool,
}

impl AdvanceOp {
    /// Creates an advance for `key`.
    pub fn new(key: Key) -> Self {
        Self {
            key,
            since: Vts::ZERO,
            fetch_scheduled: false,
        }
    }

    /// Returns the key.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Returns the clock the request was built with.
    pub fn since(&self) -> Vts {
        self.since
    }

    /// Returns true if a fetch was enqueued to continue the loop.
    pub fn fetch_scheduled(&self) -> bool {
        self.fetch_scheduled
    }

    pub(super) fn build_request(&mut self, ctx: &ClientContext) -> SyncResult<Option<Request>> {
        validate_key(&self.key)?;
        self.since = ctx.confirmed_vts(&self.key);
        Ok(Some(Request::Advance {
            key: self.key.clone(),
            since: self.since,
        }))
    }

    pub(super) fn handle_response(
        &mut self,
        ctx: &Arc<ClientContext>,
        response: Response,
    ) -> SyncResult<()> {
        let actual = response.kind();
        let Response::Advanced { revisions, max } = response else {
            return Err(SyncError::unexpected_response(RequestKind::Advance, actual));
        };
        ctx.record(|s| s.advances_completed += 1);

        let rvts_prime = max
            .or_else(|| revisions.iter().max().copied())
            .unwrap_or(self.since);

        if revisions.is_empty() {
            debug!(key = %self.key, vts = %rvts_prime, "no new revisions");
            ctx.commit_rvts(&self.key, rvts_prime);
            return Ok(());
        }

        let present: HashSet<Vts> = ctx
            .store()
            .revisions_present(&self.key, self.since)?
            .into_iter()
            .collect();
        let missing: Vec<Vts> = revisions
            .into_iter()
            .filter(|vts| !present.contains(vts))
            .collect();

        if missing.is_empty() {
            debug!(key = %self.key, vts = %rvts_prime, "reported revisions already stored");
            ctx.commit_rvts(&self.key, rvts_prime);
            return Ok(());
        }

        debug!(
            key = %self.key,
            missing = missing.len(),
            vts = %rvts_prime,
            "scheduling fetch"
        );
        self.fetch_scheduled = true;
        ctx.record(|s| s.fetches_scheduled += 1);
        ctx.add_operation(Operation::new(
            Arc::clone(ctx),
            FetchOp::new(self.key.clone(), missing, rvts_prime),
        ));
        Ok(())
    }

    pub(super) fn on_finish(&mut self, ctx: &Arc<ClientContext>, error: Option<&SyncError>) {
        if self.fetch_scheduled {
            return;
        }
        if matches!(
            error,
            Some(SyncError::Cancelled) | Some(SyncError::InvalidKey(_))
        ) {
            ctx.end_loop(&self.key);
            return;
        }
        if ctx.continue_loop(&self.key) {
            let interval = ctx.config().advance_interval;
            ctx.add_operation_after(
                Operation::new(Arc::clone(ctx), AdvanceOp::new(self.key.clone())),
                interval,
            );
        }
    }
}

impl From<AdvanceOp> for OperationKind {
    fn from(op: AdvanceOp) -> Self {
        OperationKind::Advance(op)
    }
}
