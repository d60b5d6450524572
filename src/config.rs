use crate::error::Error;
use crate::hash::{KeyHasher, ShardKey, TypeHasher};
use std::hash::Hash;

/// Shard count used when none (or zero) is requested.
pub const DEFAULT_SHARD_COUNT: usize = 16;

/// Transport that carries entries from the shard scanners to a [`Stream`](crate::Stream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// Lock-free [`RingQueue`](crate::RingQueue) (default).
    #[default]
    Ring,
    /// A bounded `crossbeam-channel`.
    Channel,
}

/// Configuration for a ShardedMap instance.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) shard_count: usize,
    pub(crate) capacity_per_shard: Option<usize>,
}

impl Config {
    /// Create a new config with defaults (16 shards).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of shards. Must be a power of two; zero selects
    /// [`DEFAULT_SHARD_COUNT`].
    pub fn shard_count(mut self, count: usize) -> Result<Self, Error> {
        self.shard_count = validate_shard_count(count)?;
        Ok(self)
    }

    /// Set initial capacity per shard. Total capacity will be approximately
    /// `capacity_per_shard * shard_count`. Omitted by default (HashMap default).
    pub fn capacity_per_shard(mut self, capacity: usize) -> Self {
        self.capacity_per_shard = Some(capacity);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            capacity_per_shard: None,
        }
    }
}

pub(crate) fn validate_shard_count(count: usize) -> Result<usize, Error> {
    match count {
        0 => Ok(DEFAULT_SHARD_COUNT),
        n if n.is_power_of_two() => Ok(n),
        n => Err(Error::InvalidShardCount(n)),
    }
}

/// Builder for creating a ShardedMap with custom configuration.
#[derive(Debug, Default)]
pub struct ShardedMapBuilder {
    config: Config,
}

impl ShardedMapBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of shards. Must be a power of two; zero selects the default.
    pub fn shard_count(mut self, count: usize) -> Result<Self, Error> {
        self.config = self.config.shard_count(count)?;
        Ok(self)
    }

    /// Set initial capacity per shard. Total capacity ≈ `capacity_per_shard * shard_count`.
    pub fn capacity_per_shard(mut self, capacity: usize) -> Self {
        self.config = self.config.capacity_per_shard(capacity);
        self
    }

    /// Build a ShardedMap routed by the default [`TypeHasher`].
    pub fn build<K, V>(self) -> crate::ShardedMap<K, V>
    where
        K: ShardKey + Hash + Eq + Send + Sync,
        V: Send + Sync,
    {
        crate::ShardedMap::with_config(self.config)
    }

    /// Build a ShardedMap routed by a custom hasher strategy.
    pub fn build_with_hasher<K, V, S>(self, hasher: S) -> crate::ShardedMap<K, V, S>
    where
        K: Hash + Eq + Send + Sync,
        V: Send + Sync,
        S: KeyHasher<K>,
    {
        crate::ShardedMap::with_hasher(self.config, hasher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_selects_default() {
        let config = Config::new().shard_count(0).unwrap();
        assert_eq!(config.shard_count, DEFAULT_SHARD_COUNT);
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        assert_eq!(
            Config::new().shard_count(12).unwrap_err(),
            Error::InvalidShardCount(12)
        );
        assert!(ShardedMapBuilder::new().shard_count(3).is_err());
        assert!(ShardedMapBuilder::new().shard_count(1).is_ok());
    }
}
