//! Registry of local listeners for subscribed keys.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vtsync_protocol::{Key, ValueRecord};

/// Callback receiving values delivered for a subscription.
pub type ValueListener = Arc<dyn Fn(&ValueRecord) + Send + Sync>;

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

struct Entry {
    key: Key,
    listener: ValueListener,
}

/// The set of keys the local application listens to.
pub struct ListenerRegistry {
    next_id: AtomicU64,
    entries: RwLock<BTreeMap<ListenerId, Entry>>,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registers a listener for a key or pattern.
    pub fn add(&self, key: Key, listener: ValueListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().insert(id, Entry { key, listener });
        id
    }

    /// Removes a listener, returning the key it was registered for.
    pub fn remove(&self, id: ListenerId) -> Option<Key> {
        self.entries.write().remove(&id).map(|entry| entry.key)
    }

    /// Returns true if any listener is registered for exactly `key`.
    pub fn has_listener(&self, key: &Key) -> bool {
        self.entries.read().values().any(|entry| &entry.key == key)
    }

    /// Returns the listeners whose key or pattern matches a value's key,
    /// in registration order.
    pub fn listeners_for(&self, value_key: &Key) -> Vec<ValueListener> {
        self.entries
            .read()
            .values()
            .filter(|entry| entry.key.matches(value_key))
            .map(|entry| Arc::clone(&entry.listener))
            .collect()
    }

    /// Returns the total number of listeners.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> ValueListener {
        Arc::new(|_: &ValueRecord| {})
    }

    #[test]
    fn add_and_remove() {
        let registry = ListenerRegistry::new();
        let key = Key::new("room/5");
        let first = registry.add(key.clone(), noop());
        let second = registry.add(key.clone(), noop());

        assert!(registry.has_listener(&key));
        assert_eq!(registry.listeners_for(&key).len(), 2);

        assert_eq!(registry.remove(first), Some(key.clone()));
        assert!(registry.has_listener(&key));
        assert_eq!(registry.remove(second), Some(key.clone()));
        assert!(!registry.has_listener(&key));
        assert_eq!(registry.remove(second), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn patterns_receive_matching_values() {
        let registry = ListenerRegistry::new();
        registry.add(Key::new("room/*"), noop());
        registry.add(Key::new("room/5"), noop());
        registry.add(Key::new("hall/1"), noop());

        assert_eq!(registry.listeners_for(&Key::new("room/5")).len(), 2);
        assert_eq!(registry.listeners_for(&Key::new("room/6")).len(), 1);
        assert!(registry.listeners_for(&Key::new("yard/1")).is_empty());

        // A pattern listener does not make its concrete keys "listened".
        assert!(!registry.has_listener(&Key::new("room/6")));
    }
}
