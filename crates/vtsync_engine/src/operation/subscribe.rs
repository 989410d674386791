//! Subscribing to keys on the server.

use super::{validate_key, OperationKind};
use crate::error::SyncResult;
use vtsync_protocol::{Key, Request};

/// Registers or removes a server-side subscription.
pub struct SubscribeOp {
    key: Key,
    unsubscribe: bool,
}

impl SubscribeOp {
    /// Subscribes to `key`, which may be a pattern.
    pub fn subscribe(key: Key) -> Self {
        Self {
            key,
            unsubscribe: false,
        }
    }

    /// Unsubscribes from `key`.
    pub fn unsubscribe(key: Key) -> Self {
        Self {
            key,
            unsubscribe: true,
        }
    }

    /// Returns the key.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Returns true if this removes the subscription.
    pub fn is_unsubscribe(&self) -> bool {
        self.unsubscribe
    }

    pub(super) fn build_request(&self) -> SyncResult<Option<Request>> {
        validate_key(&self.key)?;
        let key = self.key.clone();
        Ok(Some(if self.unsubscribe {
            Request::Unsubscribe { key }
        } else {
            Request::Subscribe { key }
        }))
    }
}

impl From<SubscribeOp> for OperationKind {
    fn from(op: SubscribeOp) -> Self {
        OperationKind::Subscribe(op)
    }
}
