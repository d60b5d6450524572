use crate::stats::{Op, ShardOps, ShardStats};
use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::hash::Hash;
use std::sync::Arc;

/// A single shard containing a HashMap protected by a read-write lock.
///
/// Every access to `map` goes through the lock. No method calls back into
/// another shard, so a map-level operation never holds two shard locks.
pub(crate) struct Shard<K, V> {
    map: RwLock<HashMap<K, Arc<V>>>,
    stats: ShardStats,
}

impl<K, V> Shard<K, V>
where
    K: Hash + Eq + Send + Sync,
    V: Send + Sync,
{
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        let map = match capacity {
            Some(capacity) => HashMap::with_capacity(capacity),
            None => HashMap::new(),
        };
        Self {
            map: RwLock::new(map),
            stats: ShardStats::new(),
        }
    }

    /// Get a value by key, returning an Arc to enable zero-copy access.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let map = self.map.read();
        let result = map.get(key).cloned();
        self.stats.record(match result {
            Some(_) => Op::Read,
            None => Op::Miss,
        });
        result
    }

    /// Check if a key exists without cloning the value.
    pub fn contains_key(&self, key: &K) -> bool {
        self.map.read().contains_key(key)
    }

    /// Store a value, returning the one it replaced.
    pub fn insert(&self, key: K, value: V) -> Option<Arc<V>> {
        let mut map = self.map.write();
        let result = map.insert(key, Arc::new(value));
        self.stats.record(Op::Write);
        result
    }

    /// Remove a key-value pair, returning the value if it existed.
    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        let mut map = self.map.write();
        let result = map.remove(key);
        if result.is_some() {
            self.stats.record(Op::Remove);
        }
        result
    }

    /// Store `value` only if `key` is vacant. Returns whether it was stored.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        let mut map = self.map.write();
        match map.entry(key) {
            Entry::Occupied(_) => {
                self.stats.record(Op::Rejected);
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(value));
                self.stats.record(Op::Write);
                true
            }
        }
    }

    /// Replace the value under `key` with `f(current)`, all under the write
    /// lock.
    ///
    /// `f` must not touch this shard: the lock is not reentrant.
    pub fn compute<F>(&self, key: K, f: F) -> Arc<V>
    where
        F: FnOnce(Option<&V>) -> V,
    {
        let mut map = self.map.write();
        let value = match map.entry(key) {
            Entry::Occupied(mut entry) => {
                let value = Arc::new(f(Some(&**entry.get())));
                entry.insert(Arc::clone(&value));
                value
            }
            Entry::Vacant(entry) => Arc::clone(entry.insert(Arc::new(f(None)))),
        };
        self.stats.record(Op::Write);
        value
    }

    /// Get the number of entries in this shard.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Check if this shard is empty.
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Get a snapshot of statistics for this shard.
    pub fn stats(&self) -> ShardOps {
        self.stats.snapshot()
    }

    /// Append every key to `out` under a single read lock.
    pub fn keys_into(&self, out: &mut Vec<K>)
    where
        K: Clone,
    {
        let map = self.map.read();
        out.reserve(map.len());
        out.extend(map.keys().cloned());
    }

    /// Visit entries without holding the lock across `f`.
    ///
    /// Keys are snapshotted into `keys` (cleared first) under one read lock,
    /// then each key is looked up again under a fresh read lock. Keys removed
    /// in between are skipped and keys added after the snapshot are not
    /// seen. `f` may freely mutate this shard.
    ///
    /// Returns `false` if `f` asked to stop.
    pub fn for_each<F>(&self, keys: &mut Vec<K>, mut f: F) -> bool
    where
        K: Clone,
        F: FnMut(&K, &Arc<V>) -> bool,
    {
        keys.clear();
        self.keys_into(keys);

        for key in keys.iter() {
            let value = match self.map.read().get(key) {
                Some(value) => Arc::clone(value),
                None => continue,
            };
            if !f(key, &value) {
                return false;
            }
        }
        true
    }

    /// Visit entries while holding the read lock for the whole scan.
    ///
    /// `f` must not write to this shard or it deadlocks.
    pub fn for_each_locked<F>(&self, mut f: F) -> bool
    where
        F: FnMut(&K, &Arc<V>) -> bool,
    {
        let map = self.map.read();
        for (key, value) in map.iter() {
            if !f(key, value) {
                return false;
            }
        }
        true
    }
}
