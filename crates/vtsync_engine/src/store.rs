//! Local store of previously fetched revisions.

use crate::error::StoreError;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use vtsync_protocol::{Key, ValueRecord, Vts};

/// Persistent store of fetched revisions.
///
/// The engine consults it before fetching so that revisions already held
/// locally are never requested twice.
pub trait RevisionStore: Send + Sync {
    /// Returns the clocks of stored revisions for `key` newer than `after`.
    ///
    /// `key` may be a pattern, in which case every stored key it matches is
    /// considered.
    fn revisions_present(&self, key: &Key, after: Vts) -> Result<Vec<Vts>, StoreError>;

    /// Stores a fetched revision.
    fn store(&self, record: &ValueRecord) -> Result<(), StoreError>;
}

/// An in-memory revision store.
pub struct MemoryRevisionStore {
    revisions: RwLock<HashMap<Key, BTreeMap<Vts, ValueRecord>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryRevisionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            revisions: RwLock::new(HashMap::new()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent read fail, to exercise error paths.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns a stored revision.
    pub fn get(&self, key: &Key, vts: Vts) -> Option<ValueRecord> {
        self.revisions
            .read()
            .get(key)
            .and_then(|by_vts| by_vts.get(&vts))
            .cloned()
    }

    /// Returns the total number of stored revisions.
    pub fn len(&self) -> usize {
        self.revisions.read().values().map(BTreeMap::len).sum()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryRevisionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RevisionStore for MemoryRevisionStore {
    fn revisions_present(&self, key: &Key, after: Vts) -> Result<Vec<Vts>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Read("injected read failure".into()));
        }

        let revisions = self.revisions.read();
        let mut present: Vec<Vts> = revisions
            .iter()
            .filter(|(stored, _)| key.matches(stored))
            .flat_map(|(_, by_vts)| by_vts.keys().copied())
            .filter(|vts| *vts > after)
            .collect();
        present.sort_unstable();
        Ok(present)
    }

    fn store(&self, record: &ValueRecord) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write("injected write failure".into()));
        }
        self.revisions
            .write()
            .entry(record.key.clone())
            .or_default()
            .insert(record.vts, record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, vts: u64) -> ValueRecord {
        ValueRecord::put(Key::new(key), Vts::new(vts), vec![vts as u8], 0)
    }

    #[test]
    fn revisions_after_clock() {
        let store = MemoryRevisionStore::new();
        for vts in [1, 3, 5] {
            store.store(&record("room/5", vts)).unwrap();
        }
        store.store(&record("room/6", 4)).unwrap();

        let present = store
            .revisions_present(&Key::new("room/5"), Vts::new(1))
            .unwrap();
        assert_eq!(present, vec![Vts::new(3), Vts::new(5)]);
        assert_eq!(store.len(), 4);
        assert!(store.get(&Key::new("room/6"), Vts::new(4)).is_some());
    }

    #[test]
    fn pattern_lookups_span_keys() {
        let store = MemoryRevisionStore::new();
        store.store(&record("room/5", 2)).unwrap();
        store.store(&record("room/6", 1)).unwrap();
        store.store(&record("hall/1", 3)).unwrap();

        let present = store
            .revisions_present(&Key::new("room/*"), Vts::ZERO)
            .unwrap();
        assert_eq!(present, vec![Vts::new(1), Vts::new(2)]);
    }

    #[test]
    fn injected_read_failure() {
        let store = MemoryRevisionStore::new();
        store.set_fail_reads(true);
        assert!(store
            .revisions_present(&Key::new("room/5"), Vts::ZERO)
            .is_err());
    }

    #[test]
    fn injected_write_failure() {
        let store = MemoryRevisionStore::new();
        store.set_fail_writes(true);
        assert_eq!(
            store.store(&record("room/5", 1)),
            Err(StoreError::Write("injected write failure".into()))
        );
        assert!(store.is_empty());
    }
}
