//! Request handlers.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::value_log::{Append, ValueLog};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use vtsync_protocol::{AclId, AclSet, Key, Response, Vts};

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Value log (shared across all handlers).
    pub log: Arc<ValueLog>,
    subscriptions: RwLock<BTreeSet<Key>>,
    acls: RwLock<AclSet>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, log: Arc<ValueLog>) -> Self {
        let acls = config.acls.clone();
        Self {
            config,
            log,
            subscriptions: RwLock::new(BTreeSet::new()),
            acls: RwLock::new(acls),
        }
    }

    /// Returns the subscribed keys.
    pub fn subscriptions(&self) -> Vec<Key> {
        self.subscriptions.read().iter().cloned().collect()
    }

    /// Returns the ACL set.
    pub fn acls(&self) -> AclSet {
        self.acls.read().clone()
    }

    /// Replaces the ACL set.
    pub fn set_acls(&self, acls: AclSet) {
        *self.acls.write() = acls;
    }
}

/// A publish as received, before validation.
pub struct PublishRequest {
    /// Target key.
    pub key: Key,
    /// Payload, absent for deletions.
    pub data: Option<Vec<u8>>,
    /// Whether this deletes the key.
    pub delete: bool,
    /// Client-assigned creation time.
    pub created_at_ms: u64,
    /// ACL to publish under.
    pub acl_id: Option<AclId>,
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles a publish or delete.
    pub fn handle_publish(&self, request: PublishRequest) -> ServerResult<Response> {
        validate(&request.key)?;
        if let Some(acl_id) = &request.acl_id {
            if !self.context.acls.read().contains(acl_id) {
                return Err(ServerError::UnknownAcl(acl_id.clone()));
            }
        }

        let appends = if request.delete {
            let keys = if request.key.is_pattern() {
                self.context.log.live_keys(&request.key)
            } else {
                vec![request.key.clone()]
            };
            keys.into_iter()
                .map(|key| Append {
                    key,
                    data: None,
                    created_at_ms: request.created_at_ms,
                    acl_id: request.acl_id.clone(),
                })
                .collect()
        } else {
            if request.key.is_pattern() {
                return Err(ServerError::PatternPublish(request.key.to_string()));
            }
            let Some(data) = request.data else {
                return Err(ServerError::InvalidRequest("publish without data".into()));
            };
            vec![Append {
                key: request.key.clone(),
                data: Some(data),
                created_at_ms: request.created_at_ms,
                acl_id: request.acl_id,
            }]
        };

        let count = appends.len();
        let vts = self.context.log.append(appends);
        debug!(key = %request.key, delete = request.delete, count, ?vts, "published");
        Ok(Response::Published { vts })
    }

    /// Handles a subscribe.
    pub fn handle_subscribe(&self, key: Key) -> ServerResult<Response> {
        validate(&key)?;
        if self.context.subscriptions.write().insert(key.clone()) {
            debug!(%key, "subscribed");
        }
        Ok(Response::Subscribed)
    }

    /// Handles an unsubscribe. Unknown subscriptions are ignored.
    pub fn handle_unsubscribe(&self, key: Key) -> ServerResult<Response> {
        validate(&key)?;
        if self.context.subscriptions.write().remove(&key) {
            debug!(%key, "unsubscribed");
        }
        Ok(Response::Unsubscribed)
    }

    /// Handles an ACL request.
    pub fn handle_get_acls(&self) -> ServerResult<Response> {
        Ok(Response::Acls {
            acls: Some(self.context.acls()),
        })
    }

    /// Handles an advance.
    ///
    /// `max` is the clock the answer covers: the server clock when every
    /// revision fit in the batch, the last returned revision otherwise. The
    /// batch never exceeds what a single fetch returns, so a client that
    /// fetches the whole batch and commits `max` skips nothing.
    pub fn handle_advance(&self, key: Key, since: Vts) -> ServerResult<Response> {
        validate(&key)?;
        // Read the clock first so revisions appended meanwhile are reported next time.
        let clock = self.context.log.clock();
        let config = &self.context.config;
        let limit = config.max_advance_batch.min(config.max_fetch_batch);
        let (mut revisions, more) = self.context.log.revisions_after(&key, since, limit);
        revisions.retain(|vts| *vts <= clock);

        let max = if more {
            revisions.last().copied()
        } else {
            Some(clock.max(since))
        };
        debug!(%key, %since, count = revisions.len(), more, "advance answered");
        Ok(Response::Advanced { revisions, max })
    }

    /// Handles a fetch.
    pub fn handle_fetch(&self, key: Key, revisions: Vec<Vts>) -> ServerResult<Response> {
        validate(&key)?;
        let limit = self.context.config.max_fetch_batch;
        let values = self.context.log.fetch(&key, &revisions, limit);
        debug!(%key, requested = revisions.len(), returned = values.len(), "fetch answered");
        Ok(Response::Fetched {
            values: Some(values),
        })
    }
}

fn validate(key: &Key) -> ServerResult<()> {
    match key.error() {
        Some(e) => Err(ServerError::InvalidKey(e.clone())),
        None => Ok(()),
    }
}
