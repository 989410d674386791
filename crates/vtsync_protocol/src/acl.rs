//! Access-control lists carried by the protocol.
//!
//! The meaning of an ACL is decided by the server; clients only cache the
//! set and reference ACLs by id when publishing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of an access-control list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AclId(String);

impl AclId {
    /// Creates an ACL id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An access-control list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    /// ACL id.
    pub id: AclId,
    /// Principals granted by this ACL.
    pub principals: Vec<String>,
}

impl Acl {
    /// Creates an ACL.
    pub fn new(id: AclId, principals: Vec<String>) -> Self {
        Self { id, principals }
    }
}

/// The set of ACLs visible to a client, ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AclSet(BTreeMap<AclId, Acl>);

impl AclSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an ACL, replacing any ACL with the same id.
    pub fn insert(&mut self, acl: Acl) -> Option<Acl> {
        self.0.insert(acl.id.clone(), acl)
    }

    /// Returns the ACL with the given id.
    pub fn get(&self, id: &AclId) -> Option<&Acl> {
        self.0.get(id)
    }

    /// Returns true if an ACL with the given id exists.
    pub fn contains(&self, id: &AclId) -> bool {
        self.0.contains_key(id)
    }

    /// Returns the number of ACLs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the ACLs in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Acl> {
        self.0.values()
    }
}

impl FromIterator<Acl> for AclSet {
    fn from_iter<I: IntoIterator<Item = Acl>>(iter: I) -> Self {
        let mut set = Self::new();
        for acl in iter {
            set.insert(acl);
        }
        set
    }
}
