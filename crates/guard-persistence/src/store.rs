//! Key/value record store.
//!
//! Storage technology is not fixed; components talk to `RecordStore`
//! and the daemon wires the in-memory backend.

use dashmap::DashMap;
use std::hash::Hash;

/// Key/value record store.
///
/// `update` runs the closure while holding the record's entry lock, so
/// concurrent updates to the same key are serialized.
pub trait RecordStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;

    /// Insert or replace. Returns the previous value.
    fn put(&self, key: K, value: V) -> Option<V>;

    /// Mutate an existing record in place.
    fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R>;

    /// Mutate the record, creating it with `init` when absent.
    fn upsert<R>(&self, key: K, init: impl FnOnce() -> V, f: impl FnOnce(&mut V) -> R) -> R;

    fn remove(&self, key: &K) -> Option<V>;

    fn contains(&self, key: &K) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `DashMap`-backed store.
#[derive(Debug)]
pub struct InMemoryStore<K: Eq + Hash, V> {
    records: DashMap<K, V>,
}

impl<K: Eq + Hash, V> Default for InMemoryStore<K, V> {
    fn default() -> Self {
        Self {
            records: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> InMemoryStore<K, V> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K, V> RecordStore<K, V> for InMemoryStore<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.records.get(key).map(|r| r.value().clone())
    }

    fn put(&self, key: K, value: V) -> Option<V> {
        self.records.insert(key, value)
    }

    fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.records.get_mut(key).map(|mut r| f(r.value_mut()))
    }

    fn upsert<R>(&self, key: K, init: impl FnOnce() -> V, f: impl FnOnce(&mut V) -> R) -> R {
        let mut entry = self.records.entry(key).or_insert_with(init);
        f(entry.value_mut())
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.records.remove(key).map(|(_, v)| v)
    }

    fn contains(&self, key: &K) -> bool {
        self.records.contains_key(key)
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_put_get_remove() {
        let store: InMemoryStore<String, u32> = InMemoryStore::new();
        assert!(store.is_empty());

        assert_eq!(store.put("a".into(), 1), None);
        assert_eq!(store.put("a".into(), 2), Some(1));
        assert_eq!(store.get(&"a".into()), Some(2));
        assert!(store.contains(&"a".into()));

        assert_eq!(store.remove(&"a".into()), Some(2));
        assert_eq!(store.get(&"a".into()), None);
    }

    #[test]
    fn test_update_missing_returns_none() {
        let store: InMemoryStore<String, u32> = InMemoryStore::new();
        assert_eq!(store.update(&"x".into(), |v| *v += 1), None);
    }

    #[test]
    fn test_upsert_concurrent_increments() {
        let store: Arc<InMemoryStore<&'static str, u64>> = Arc::new(InMemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        store.upsert("counter", || 0, |v| *v += 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.get(&"counter"), Some(8000));
    }
}
