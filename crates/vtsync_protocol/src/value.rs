//! Values published under keys.

use crate::acl::AclId;
use crate::key::Key;
use crate::vts::Vts;
use serde::{Deserialize, Serialize};

/// A single revision of a key, as stored by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRecord {
    /// The concrete key this revision belongs to.
    pub key: Key,
    /// Clock assigned by the server.
    pub vts: Vts,
    /// Published payload, absent for deletions.
    pub data: Option<Vec<u8>>,
    /// Whether this revision deletes the key.
    pub deleted: bool,
    /// Client-assigned creation time, milliseconds since the Unix epoch.
    pub created_at_ms: u64,
    /// ACL the revision was published under.
    pub acl_id: Option<AclId>,
}

impl ValueRecord {
    /// Creates a revision carrying data.
    pub fn put(key: Key, vts: Vts, data: Vec<u8>, created_at_ms: u64) -> Self {
        Self {
            key,
            vts,
            data: Some(data),
            deleted: false,
            created_at_ms,
            acl_id: None,
        }
    }

    /// Creates a deletion revision.
    pub fn tombstone(key: Key, vts: Vts, created_at_ms: u64) -> Self {
        Self {
            key,
            vts,
            data: None,
            deleted: true,
            created_at_ms,
            acl_id: None,
        }
    }

    /// Sets the ACL id.
    pub fn with_acl(mut self, acl_id: AclId) -> Self {
        self.acl_id = Some(acl_id);
        self
    }

    /// Returns the size of the payload in bytes.
    pub fn payload_size(&self) -> usize {
        self.data.as_ref().map(|d| d.len()).unwrap_or(0)
    }
}
