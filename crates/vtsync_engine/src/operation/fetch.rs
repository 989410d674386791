//! Fetching revisions an advance found missing.

use super::{validate_key, AdvanceOp, Operation, OperationKind};
use crate::context::ClientContext;
use crate::error::{SyncError, SyncResult};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use vtsync_protocol::{Key, Request, RequestKind, Response, Vts};

/// One fetch step of the reconciliation loop.
pub struct FetchOp {
    key: Key,
    revisions: Vec<Vts>,
    rvts_prime: Vts,
}

impl FetchOp {
    /// Creates a fetch of `revisions` for `key`, committing `rvts_prime` as
    /// the confirmed clock once the values arrive.
    pub fn new(key: Key, revisions: Vec<Vts>, rvts_prime: Vts) -> Self {
        Self {
            key,
            revisions,
            rvts_prime,
        }
    }

    /// Returns the key.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Returns the revisions to fetch.
    pub fn revisions(&self) -> &[Vts] {
        &self.revisions
    }

    /// Returns the clock committed on success.
    pub fn rvts_prime(&self) -> Vts {
        self.rvts_prime
    }

    pub(super) fn build_request(&self) -> SyncResult<Option<Request>> {
        validate_key(&self.key)?;
        Ok(Some(Request::Fetch {
            key: self.key.clone(),
            revisions: self.revisions.clone(),
        }))
    }

    pub(super) fn handle_response(
        &mut self,
        ctx: &ClientContext,
        response: Response,
    ) -> SyncResult<()> {
        let actual = response.kind();
        let Response::Fetched { values } = response else {
            return Err(SyncError::unexpected_response(RequestKind::Fetch, actual));
        };
        let Some(values) = values else {
            return Err(SyncError::MalformedResponse(
                "fetch response without values".into(),
            ));
        };

        let mut delivered = 0usize;
        for value in values {
            if !ctx.update_latest(&value) {
                trace!(key = %value.key, vts = %value.vts, "stale value dropped");
                ctx.record(|s| s.values_dropped += 1);
                continue;
            }
            if let Err(e) = ctx.store().store(&value) {
                warn!(key = %value.key, vts = %value.vts, error = %e, "failed to store fetched value");
            }
            delivered += 1;
            ctx.deliver(value);
        }

        let committed = ctx.commit_rvts(&self.key, self.rvts_prime);
        debug!(key = %self.key, delivered, vts = %committed, "fetch committed");
        Ok(())
    }

    pub(super) fn on_finish(&mut self, ctx: &Arc<ClientContext>, error: Option<&SyncError>) {
        if matches!(
            error,
            Some(SyncError::Cancelled) | Some(SyncError::InvalidKey(_))
        ) {
            ctx.end_loop(&self.key);
            return;
        }
        if !ctx.continue_loop(&self.key) {
            return;
        }

        let next = Operation::new(Arc::clone(ctx), AdvanceOp::new(self.key.clone()));
        match error {
            // More changes may be pending; advance again right away.
            None => ctx.add_operation(next),
            Some(_) => ctx.add_operation_after(next, ctx.config().advance_interval),
        }
    }
}

impl From<FetchOp> for OperationKind {
    fn from(op: FetchOp) -> Self {
        OperationKind::Fetch(op)
    }
}

#[cfg(test)]
mod tests {
    use super::super::harness::Harness;
    use super::*;
    use std::time::Duration;
    use vtsync_protocol::ValueRecord;

    fn value(key: &Key, vts: u64, data: &str) -> ValueRecord {
        ValueRecord::put(key.clone(), Vts::new(vts), data.as_bytes().to_vec(), vts * 10)
    }

    #[tokio::test]
    async fn request_lists_exactly_the_missing_revisions() {
        let h = Harness::new();
        let key = Key::new("room/5");
        h.run(FetchOp::new(key.clone(), vec![Vts::new(9)], Vts::new(9)));

        assert_eq!(
            h.transport.sent_requests(),
            vec![Request::Fetch {
                key,
                revisions: vec![Vts::new(9)]
            }]
        );
    }

    #[tokio::test]
    async fn new_values_are_delivered_in_order() {
        let h = Harness::new();
        let key = Key::new("room/5");
        let mut rx = h.listen(&key);
        h.transport.script_response(Response::Fetched {
            values: Some(vec![value(&key, 1, "a"), value(&key, 2, "b")]),
        });

        h.run(FetchOp::new(key.clone(), vec![Vts::new(1), Vts::new(2)], Vts::new(2)));

        assert_eq!(rx.recv().await.unwrap().vts, Vts::new(1));
        assert_eq!(rx.recv().await.unwrap().vts, Vts::new(2));
        assert_eq!(h.ctx.confirmed_vts(&key), Vts::new(2));
        assert_eq!(h.ctx.latest_value(&key).unwrap().data, Some(b"b".to_vec()));
        assert_eq!(h.store.len(), 2);
    }

    #[tokio::test]
    async fn stale_values_are_dropped_but_clock_commits() {
        let h = Harness::new();
        let key = Key::new("room/5");
        h.ctx.update_latest(&value(&key, 5, "cached"));
        let mut rx = h.listen(&key);
        h.transport.script_response(Response::Fetched {
            values: Some(vec![value(&key, 4, "old"), value(&key, 5, "same")]),
        });

        h.run(FetchOp::new(key.clone(), vec![Vts::new(4), Vts::new(5)], Vts::new(6)));
        h.flush_callbacks().await;

        assert!(rx.try_recv().is_err());
        assert_eq!(h.ctx.confirmed_vts(&key), Vts::new(6));
        assert_eq!(h.ctx.stats().values_dropped, 2);
        assert_eq!(h.ctx.latest_value(&key).unwrap().data, Some(b"cached".to_vec()));
    }

    #[tokio::test]
    async fn store_failure_still_delivers_and_commits() {
        let h = Harness::new();
        let key = Key::new("room/5");
        h.store.set_fail_writes(true);
        let mut rx = h.listen(&key);
        h.transport.script_response(Response::Fetched {
            values: Some(vec![value(&key, 1, "a")]),
        });

        let op = h.run(FetchOp::new(key.clone(), vec![Vts::new(1)], Vts::new(1)));

        assert!(op.error().is_none());
        assert_eq!(rx.recv().await.unwrap().vts, Vts::new(1));
        assert_eq!(h.ctx.confirmed_vts(&key), Vts::new(1));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn pattern_fetch_routes_values_by_their_own_key() {
        let h = Harness::new();
        let pattern = Key::new("room/*");
        let mut room5 = h.listen(&Key::new("room/5"));
        let mut all = h.listen(&pattern);
        h.transport.script_response(Response::Fetched {
            values: Some(vec![
                value(&Key::new("room/6"), 1, "six"),
                value(&Key::new("room/5"), 2, "five"),
            ]),
        });

        h.run(FetchOp::new(pattern.clone(), vec![Vts::new(1), Vts::new(2)], Vts::new(2)));

        assert_eq!(all.recv().await.unwrap().key, Key::new("room/6"));
        assert_eq!(all.recv().await.unwrap().key, Key::new("room/5"));
        assert_eq!(room5.recv().await.unwrap().key, Key::new("room/5"));
        h.flush_callbacks().await;
        assert!(room5.try_recv().is_err());
        assert_eq!(h.ctx.confirmed_vts(&pattern), Vts::new(2));
    }

    #[tokio::test]
    async fn missing_values_are_malformed() {
        let h = Harness::new();
        let key = Key::new("room/5");
        h.transport.script_response(Response::Fetched { values: None });

        let op = h.run(FetchOp::new(key.clone(), vec![Vts::new(1)], Vts::new(1)));

        assert!(matches!(op.error(), Some(SyncError::MalformedResponse(_))));
        assert_eq!(h.ctx.confirmed_vts(&key), Vts::ZERO);
        assert!(h.ctx.latest_value(&key).is_none());
    }

    #[tokio::test]
    async fn wrong_kind_is_malformed() {
        let h = Harness::new();
        let key = Key::new("room/5");
        h.transport.script(
            RequestKind::Fetch,
            Ok(Response::Advanced {
                revisions: vec![],
                max: None,
            }),
        );

        let op = h.run(FetchOp::new(key.clone(), vec![Vts::new(1)], Vts::new(1)));

        assert!(matches!(op.error(), Some(SyncError::MalformedResponse(_))));
        assert_eq!(h.ctx.confirmed_vts(&key), Vts::ZERO);
    }

    #[tokio::test]
    async fn success_schedules_immediate_advance() {
        let h = Harness::new();
        let key = Key::new("room/5");
        let _rx = h.listen(&key);
        h.transport
            .script_response(Response::Fetched { values: Some(vec![]) });

        h.run(FetchOp::new(key.clone(), vec![Vts::new(1)], Vts::new(1)));

        let queued = h.queue.take();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].operation.name(), "advance");
        assert_eq!(queued[0].operation.key(), Some(key));
        assert_eq!(queued[0].delay, Duration::ZERO);
    }

    #[tokio::test]
    async fn failure_schedules_delayed_advance() {
        let h = Harness::new();
        let key = Key::new("room/5");
        let _rx = h.listen(&key);
        h.transport
            .script_response(Response::error(RequestKind::Fetch, "busy"));

        h.run(FetchOp::new(key, vec![Vts::new(1)], Vts::new(1)));

        let queued = h.queue.take();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].delay, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn no_listener_ends_loop() {
        let h = Harness::new();
        let key = Key::new("room/5");
        h.transport
            .script_response(Response::Fetched { values: Some(vec![]) });

        h.run(FetchOp::new(key.clone(), vec![Vts::new(1)], Vts::new(1)));

        assert!(h.queue.is_empty());
        assert!(!h.ctx.is_looping(&key));
    }
}
