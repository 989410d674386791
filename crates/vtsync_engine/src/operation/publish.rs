//! Publishing values.

use super::{validate_key, OperationKind};
use crate::context::ClientContext;
use crate::error::{SyncError, SyncResult};
use std::time::{SystemTime, UNIX_EPOCH};
use vtsync_protocol::{AclId, Key, Request};

/// Completion handler for a publish, run on the callback queue.
pub type PublishHandler = Box<dyn FnOnce(Key, Option<SyncError>) + Send + 'static>;

/// Publishes a value under a key, or deletes it.
///
/// Publishing to a pattern is rejected; deleting through a pattern is
/// allowed and removes every matching key on the server.
pub struct PublishOp {
    key: Key,
    data: Option<Vec<u8>>,
    delete: bool,
    created_at_ms: u64,
    acl_id: Option<AclId>,
    handler: Option<PublishHandler>,
}

impl PublishOp {
    /// Publishes `data` under `key`.
    pub fn new(key: Key, data: Vec<u8>) -> Self {
        Self {
            key,
            data: Some(data),
            delete: false,
            created_at_ms: now_ms(),
            acl_id: None,
            handler: None,
        }
    }

    /// Deletes `key`.
    pub fn delete(key: Key) -> Self {
        Self {
            key,
            data: None,
            delete: true,
            created_at_ms: now_ms(),
            acl_id: None,
            handler: None,
        }
    }

    /// Publishes under an ACL.
    pub fn with_acl(mut self, acl_id: AclId) -> Self {
        self.acl_id = Some(acl_id);
        self
    }

    /// Overrides the creation timestamp.
    pub fn with_created_at(mut self, created_at_ms: u64) -> Self {
        self.created_at_ms = created_at_ms;
        self
    }

    /// Sets the completion handler.
    pub fn with_handler(
        mut self,
        handler: impl FnOnce(Key, Option<SyncError>) + Send + 'static,
    ) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Returns the key.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Returns true if this deletes the key.
    pub fn is_delete(&self) -> bool {
        self.delete
    }

    pub(super) fn build_request(&self) -> SyncResult<Option<Request>> {
        validate_key(&self.key)?;
        if self.key.is_pattern() && !self.delete {
            return Err(SyncError::PatternPublish(self.key.to_string()));
        }

        Ok(Some(Request::Publish {
            key: self.key.clone(),
            data: self.data.clone(),
            delete: self.delete,
            created_at_ms: self.created_at_ms,
            acl_id: self.acl_id.clone(),
        }))
    }

    pub(super) fn on_finish(&mut self, ctx: &ClientContext, error: Option<&SyncError>) {
        if let Some(handler) = self.handler.take() {
            let key = self.key.clone();
            let error = error.cloned();
            ctx.callbacks().dispatch(move || handler(key, error));
        }
    }
}

impl From<PublishOp> for OperationKind {
    fn from(op: PublishOp) -> Self {
        OperationKind::Publish(op)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
