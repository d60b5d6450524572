use crate::config::{Config, Transport};
use crate::error::Error;
use crate::hash::{KeyHasher, ShardKey, TypeHasher};
use crate::iter::Stream;
use crate::shard::Shard;
use crate::stats::{ShardOps, Stats};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Concurrent map split into independently locked shards.
///
/// Every key is routed to exactly one shard with
/// `hasher.hash_key(key) & (shard_count - 1)`, and every operation locks only
/// that shard. No operation ever holds two shard locks at once. Values are
/// stored behind `Arc<V>` so reads and iteration can hand them out without
/// copying.
///
/// # Example
///
/// ```rust
/// use cmap::ShardedMap;
///
/// let map = ShardedMap::new();
/// map.set("key1", "value1");
///
/// if let Some(value) = map.get(&"key1") {
///     println!("Found: {}", *value);
/// }
/// ```
pub struct ShardedMap<K, V, S = TypeHasher> {
    shards: Vec<Shard<K, V>>,
    shard_mask: usize,
    hasher: S,
}

impl<K, V> ShardedMap<K, V>
where
    K: ShardKey + Hash + Eq + Send + Sync,
    V: Send + Sync,
{
    /// Create a new map with defaults (16 shards, [`TypeHasher`]).
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a map with `shard_count` shards.
    ///
    /// Zero selects [`DEFAULT_SHARD_COUNT`](crate::DEFAULT_SHARD_COUNT); any
    /// other count must be a power of two.
    ///
    /// ```rust
    /// use cmap::{Error, ShardedMap};
    ///
    /// let map = ShardedMap::<String, u32>::with_shard_count(64)?;
    /// assert_eq!(map.num_shards(), 64);
    ///
    /// assert!(ShardedMap::<String, u32>::with_shard_count(48).is_err());
    /// # Ok::<(), Error>(())
    /// ```
    pub fn with_shard_count(shard_count: usize) -> Result<Self, Error> {
        let config = Config::default().shard_count(shard_count)?;
        Ok(Self::with_config(config))
    }

    /// Create a new map with custom config.
    pub fn with_config(config: Config) -> Self {
        Self::with_hasher(config, TypeHasher)
    }
}

impl<K, V, S> ShardedMap<K, V, S>
where
    K: Hash + Eq + Send + Sync,
    V: Send + Sync,
    S: KeyHasher<K>,
{
    /// Create a map that routes keys with a custom hasher strategy.
    ///
    /// ```rust
    /// use cmap::{Config, ShardedMap};
    ///
    /// // Route by the low bits of the key itself.
    /// let map = ShardedMap::with_hasher(Config::new().shard_count(4)?, |k: &u64| *k);
    /// map.set(6, "six");
    /// assert_eq!(map.shard_for_key(&6), 2);
    /// # Ok::<(), cmap::Error>(())
    /// ```
    pub fn with_hasher(config: Config, hasher: S) -> Self {
        let shard_count = config.shard_count;
        debug_assert!(shard_count.is_power_of_two());

        let mut shards = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            shards.push(Shard::with_capacity(config.capacity_per_shard));
        }
        tracing::debug!(
            shard_count,
            capacity_per_shard = ?config.capacity_per_shard,
            "created sharded map"
        );

        Self {
            shards,
            shard_mask: shard_count - 1,
            hasher,
        }
    }

    /// Figure out which shard this key belongs to.
    #[inline]
    fn shard_index(&self, key: &K) -> usize {
        let hash = self.hasher.hash_key(key);
        (hash as usize) & self.shard_mask
    }

    #[inline]
    fn shard_of(&self, key: &K) -> &Shard<K, V> {
        &self.shards[self.shard_index(key)]
    }

    pub(crate) fn shard(&self, index: usize) -> &Shard<K, V> {
        &self.shards[index]
    }

    /// Index of the shard that holds (or would hold) `key`.
    ///
    /// Stable for the lifetime of the map.
    pub fn shard_for_key(&self, key: &K) -> usize {
        self.shard_index(key)
    }

    /// Number of shards, fixed at construction.
    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Get a value by key. Returns an `Arc<V>` so you can share it without copying.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cmap::ShardedMap;
    ///
    /// let map = ShardedMap::new();
    /// map.set("key", "value");
    ///
    /// assert_eq!(*map.get(&"key").unwrap(), "value");
    /// assert!(map.get(&"missing").is_none());
    /// ```
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.shard_of(key).get(key)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.shard_of(key).contains_key(key)
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set(&self, key: K, value: V) {
        let shard = self.shard_of(&key);
        shard.insert(key, value);
    }

    /// Store `value` only if `key` is absent. Returns whether it was stored.
    ///
    /// The check and the store happen under one write lock.
    ///
    /// ```rust
    /// use cmap::ShardedMap;
    ///
    /// let map = ShardedMap::new();
    /// assert!(map.set_if_absent("k", 1));
    /// assert!(!map.set_if_absent("k", 2));
    /// assert_eq!(*map.get(&"k").unwrap(), 1);
    /// ```
    pub fn set_if_absent(&self, key: K, value: V) -> bool {
        let shard = self.shard_of(&key);
        shard.insert_if_absent(key, value)
    }

    /// Remove `key` if present.
    pub fn delete(&self, key: &K) {
        self.shard_of(key).remove(key);
    }

    /// Remove `key`, returning its value if it was present.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cmap::ShardedMap;
    ///
    /// let map = ShardedMap::new();
    /// map.set("x", 1);
    /// assert_eq!(map.delete_and_get(&"x").as_deref(), Some(&1));
    /// assert!(map.get(&"x").is_none());
    /// ```
    pub fn delete_and_get(&self, key: &K) -> Option<Arc<V>> {
        self.shard_of(key).remove(key)
    }

    /// Replace the value under `key` with `f(current)`, atomically with
    /// respect to every other operation on the same shard. Returns the stored
    /// value.
    ///
    /// `f` receives `None` when the key is absent.
    ///
    /// # Deadlocks
    ///
    /// `f` runs while the shard's write lock is held. It must not call any
    /// method on this map: touching the same shard deadlocks, and touching
    /// another shard can invert lock order against concurrent updates.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cmap::ShardedMap;
    ///
    /// let map: ShardedMap<&str, u32> = ShardedMap::new();
    /// map.update("counter", |v| v.copied().unwrap_or(0) + 1);
    /// map.update("counter", |v| v.copied().unwrap_or(0) + 1);
    /// assert_eq!(*map.get(&"counter").unwrap(), 2);
    /// ```
    pub fn update<F>(&self, key: K, f: F) -> Arc<V>
    where
        F: FnOnce(Option<&V>) -> V,
    {
        let shard = self.shard_of(&key);
        shard.compute(key, f)
    }

    /// Store `value` under `key`, returning the previous value if any.
    pub fn swap(&self, key: K, value: V) -> Option<Arc<V>> {
        let shard = self.shard_of(&key);
        shard.insert(key, value)
    }

    /// Get the total number of entries across all shards.
    ///
    /// Each shard is counted under its own lock, so with concurrent writers
    /// this is a sum of independently fresh counts, not a snapshot.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.len()).sum()
    }

    /// Check if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.is_empty())
    }

    /// Collect every key, one shard at a time.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        let mut keys = Vec::with_capacity(self.len());
        for shard in &self.shards {
            shard.keys_into(&mut keys);
        }
        keys
    }

    /// Visit every entry without holding a lock while `f` runs.
    ///
    /// Each shard's keys are snapshotted first, then looked up one by one.
    /// It **is** safe to modify the map from `f`. Consistency is weak and
    /// implementation defined: keys removed after their shard was
    /// snapshotted are skipped, and keys added after it are not visited.
    ///
    /// Return `false` from `f` to stop early. Returns `true` if every entry
    /// was visited.
    ///
    /// ```rust
    /// use cmap::ShardedMap;
    ///
    /// let map = ShardedMap::new();
    /// for i in 0..10u32 {
    ///     map.set(i, i);
    /// }
    ///
    /// // Deleting from inside the callback is fine.
    /// map.for_each(|k, v| {
    ///     if v % 2 == 1 {
    ///         map.delete(k);
    ///     }
    ///     true
    /// });
    /// assert_eq!(map.len(), 5);
    /// ```
    pub fn for_each<F>(&self, mut f: F) -> bool
    where
        K: Clone,
        F: FnMut(&K, &V) -> bool,
    {
        let mut keys = Vec::new();
        for shard in &self.shards {
            if !shard.for_each(&mut keys, |k, v| f(k, &**v)) {
                return false;
            }
        }
        true
    }

    /// Visit every entry while holding each shard's read lock for the whole
    /// of that shard's scan.
    ///
    /// Faster than [`for_each`](Self::for_each) and consistent within a
    /// shard, but it is **not** safe to modify the map from `f`.
    pub fn for_each_exclusive<F>(&self, mut f: F) -> bool
    where
        F: FnMut(&K, &V) -> bool,
    {
        for shard in &self.shards {
            if !shard.for_each_locked(|k, v| f(k, &**v)) {
                return false;
            }
        }
        true
    }

    /// Like [`for_each`](Self::for_each), but scans all shards at once, one
    /// scoped thread per shard. The first `false` stops every shard.
    pub fn for_each_parallel<F>(&self, f: F) -> bool
    where
        K: Clone,
        F: Fn(&K, &V) -> bool + Sync,
    {
        let stopped = AtomicBool::new(false);
        thread::scope(|scope| {
            for shard in &self.shards {
                let f = &f;
                let stopped = &stopped;
                scope.spawn(move || {
                    let mut keys = Vec::new();
                    shard.for_each(&mut keys, |k, v| {
                        if stopped.load(Ordering::Acquire) {
                            return false;
                        }
                        if !f(k, &**v) {
                            stopped.store(true, Ordering::Release);
                            return false;
                        }
                        true
                    });
                });
            }
        });
        !stopped.load(Ordering::Acquire)
    }

    /// Get detailed statistics about the map and its shards.
    pub fn stats(&self) -> Stats {
        let shard_sizes = self.shard_loads();
        let operations: Vec<ShardOps> = self.shards.iter().map(|s| s.stats()).collect();
        let size: usize = shard_sizes.iter().sum();

        Stats {
            size,
            shard_sizes,
            operations,
        }
    }

    /// Number of entries in each shard.
    pub fn shard_loads(&self) -> Vec<usize> {
        self.shards.iter().map(|s| s.len()).collect()
    }
}

impl<K, V, S> ShardedMap<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: KeyHasher<K> + 'static,
{
    /// Stream every entry through a lock-free [`RingQueue`](crate::RingQueue)
    /// of `buffer` slots (at least one).
    ///
    /// One scanner thread per shard feeds the queue. Drop the stream (or call
    /// [`Stream::cancel`]) to stop early; either way the scanners are drained
    /// and joined, so no thread outlives the stream.
    pub fn iterate(self: Arc<Self>, buffer: usize) -> Stream<K, V> {
        self.iterate_with(Transport::Ring, buffer)
    }

    /// Like [`iterate`](Self::iterate), with an explicit transport.
    pub fn iterate_with(self: Arc<Self>, transport: Transport, buffer: usize) -> Stream<K, V> {
        Stream::spawn(self, transport, buffer)
    }
}

impl<K, V> Default for ShardedMap<K, V>
where
    K: ShardKey + Hash + Eq + Send + Sync,
    V: Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> std::fmt::Debug for ShardedMap<K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedMap")
            .field("shards", &self.shards.len())
            .finish_non_exhaustive()
    }
}
