//! Server-side value log.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use vtsync_protocol::{AclId, Key, ValueRecord, Vts};

/// Every revision ever published, by key.
///
/// The log maintains:
/// - All revisions of each concrete key, ordered by clock
/// - The global clock; every append takes the next value
pub struct ValueLog {
    inner: RwLock<Inner>,
}

struct Inner {
    revisions: HashMap<Key, BTreeMap<Vts, ValueRecord>>,
    clock: Vts,
}

/// A revision to append, before the log assigns its clock.
#[derive(Debug, Clone)]
pub struct Append {
    /// Concrete key.
    pub key: Key,
    /// Payload; `None` for a tombstone.
    pub data: Option<Vec<u8>>,
    /// Client-assigned creation time.
    pub created_at_ms: u64,
    /// ACL guarding the value.
    pub acl_id: Option<AclId>,
}

impl ValueLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                revisions: HashMap::new(),
                clock: Vts::ZERO,
            }),
        }
    }

    /// Returns the clock of the latest revision, or zero.
    pub fn clock(&self) -> Vts {
        self.inner.read().clock
    }

    /// Appends revisions atomically, returning the clock of the last one.
    pub fn append(&self, appends: Vec<Append>) -> Option<Vts> {
        let mut inner = self.inner.write();
        let mut last = None;
        for append in appends {
            let vts = inner.clock.next();
            inner.clock = vts;

            let record = ValueRecord {
                deleted: append.data.is_none(),
                key: append.key.clone(),
                vts,
                data: append.data,
                created_at_ms: append.created_at_ms,
                acl_id: append.acl_id,
            };
            inner
                .revisions
                .entry(append.key)
                .or_default()
                .insert(vts, record);
            last = Some(vts);
        }
        last
    }

    /// Returns the concrete keys matching `key` whose latest revision is live.
    pub fn live_keys(&self, key: &Key) -> Vec<Key> {
        let inner = self.inner.read();
        let mut keys: Vec<Key> = inner
            .revisions
            .iter()
            .filter(|(stored, _)| key.matches(stored))
            .filter(|(_, by_vts)| {
                by_vts
                    .values()
                    .next_back()
                    .is_some_and(|latest| !latest.deleted)
            })
            .map(|(stored, _)| stored.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Returns up to `limit` revision clocks after `since` for every key
    /// matching `key`, in clock order, and whether more remain.
    pub fn revisions_after(&self, key: &Key, since: Vts, limit: usize) -> (Vec<Vts>, bool) {
        let inner = self.inner.read();
        let mut revisions: Vec<Vts> = inner
            .revisions
            .iter()
            .filter(|(stored, _)| key.matches(stored))
            .flat_map(|(_, by_vts)| {
                by_vts
                    .range((Bound::Excluded(since), Bound::Unbounded))
                    .map(|(vts, _)| *vts)
            })
            .collect();
        revisions.sort_unstable();

        let more = revisions.len() > limit;
        revisions.truncate(limit);
        (revisions, more)
    }

    /// Returns the revisions with the given clocks under keys matching
    /// `key`, in clock order, skipping clocks it does not hold.
    pub fn fetch(&self, key: &Key, revisions: &[Vts], limit: usize) -> Vec<ValueRecord> {
        let inner = self.inner.read();
        let mut values: Vec<ValueRecord> = inner
            .revisions
            .iter()
            .filter(|(stored, _)| key.matches(stored))
            .flat_map(|(_, by_vts)| revisions.iter().filter_map(|vts| by_vts.get(vts)))
            .cloned()
            .collect();
        values.sort_by_key(|value| value.vts);
        values.dedup_by_key(|value| value.vts);
        values.truncate(limit);
        values
    }

    /// Returns the latest revision of a concrete key.
    pub fn latest(&self, key: &Key) -> Option<ValueRecord> {
        self.inner
            .read()
            .revisions
            .get(key)
            .and_then(|by_vts| by_vts.values().next_back())
            .cloned()
    }

    /// Returns the number of revisions.
    pub fn len(&self) -> usize {
        self.inner.read().revisions.values().map(BTreeMap::len).sum()
    }

    /// Returns true if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ValueLog {
    fn default() -> Self {
        Self::new()
    }
}
