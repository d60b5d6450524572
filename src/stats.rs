//! Statistics and diagnostics types.

#[cfg(feature = "metrics")]
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-shard operation counts.
///
/// All zero unless the crate is built with the `metrics` feature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardOps {
    /// Lookups that found a value.
    pub reads: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Values actually stored (`set`, `swap`, `update`, and a
    /// `set_if_absent` that won).
    pub writes: u64,
    /// `set_if_absent` calls that found the key already present.
    pub rejected: u64,
    /// Removals that found a value.
    pub removes: u64,
}

/// What a shard operation did, for counting.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Op {
    Read,
    Miss,
    Write,
    Rejected,
    Remove,
}

const OP_KINDS: usize = 5;

/// Counters for one shard. Compiles to nothing without `metrics`.
#[derive(Default)]
pub(crate) struct ShardStats {
    #[cfg(feature = "metrics")]
    counts: [AtomicU64; OP_KINDS],
}

impl ShardStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record(&self, op: Op) {
        #[cfg(feature = "metrics")]
        self.counts[op as usize].fetch_add(1, Ordering::Relaxed);
        #[cfg(not(feature = "metrics"))]
        let _ = op;
    }

    pub fn snapshot(&self) -> ShardOps {
        #[cfg(feature = "metrics")]
        let counts: [u64; OP_KINDS] =
            std::array::from_fn(|i| self.counts[i].load(Ordering::Relaxed));
        #[cfg(not(feature = "metrics"))]
        let counts = [0u64; OP_KINDS];

        ShardOps {
            reads: counts[Op::Read as usize],
            misses: counts[Op::Miss as usize],
            writes: counts[Op::Write as usize],
            rejected: counts[Op::Rejected as usize],
            removes: counts[Op::Remove as usize],
        }
    }
}

/// Aggregate statistics for a ShardedMap instance.
///
/// Sizes are read shard by shard, so under concurrent mutation `size` is the
/// sum of independently fresh counts rather than a snapshot.
#[derive(Debug, Clone)]
pub struct Stats {
    /// Total number of entries across all shards.
    pub size: usize,
    /// Number of entries in each shard.
    pub shard_sizes: Vec<usize>,
    /// Operation counts for each shard (all zero without the `metrics` feature).
    pub operations: Vec<ShardOps>,
}

impl Stats {
    /// Operation counts summed over every shard.
    pub fn totals(&self) -> ShardOps {
        self.operations
            .iter()
            .fold(ShardOps::default(), |acc, ops| ShardOps {
                reads: acc.reads + ops.reads,
                misses: acc.misses + ops.misses,
                writes: acc.writes + ops.writes,
                rejected: acc.rejected + ops.rejected,
                removes: acc.removes + ops.removes,
            })
    }

    /// Largest shard size divided by the mean shard size.
    ///
    /// Returns 0.0 for an empty map.
    pub fn max_load_ratio(&self) -> f64 {
        if self.size == 0 || self.shard_sizes.is_empty() {
            return 0.0;
        }
        let avg = self.size as f64 / self.shard_sizes.len() as f64;
        let max = self.shard_sizes.iter().copied().max().unwrap_or(0);
        max as f64 / avg
    }
}
