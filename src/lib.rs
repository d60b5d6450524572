//! # cmap
//!
//! A concurrent key-value map that scales across cores by splitting its key
//! space into independently locked shards, plus a streaming iterator that
//! walks every entry without holding any shard lock while the caller works.
//!
//! Each key is routed to exactly one shard with `hash(key) & (shards - 1)`.
//! Operations on different shards never block each other, and no operation
//! ever holds two shard locks. Values are stored behind `Arc<V>` so they can
//! be shared without copying.
//!
//! ## Features
//!
//! - **Sharded locking**: one `parking_lot::RwLock` per shard, fixed shard count
//! - **Pluggable routing**: type-based default hasher, ahash, or any closure
//! - **Safe traversal**: `for_each` snapshots keys so callbacks may mutate the map
//! - **Streaming**: `iterate` fans one scanner thread per shard into a
//!   lock-free ring queue (or a crossbeam channel)
//! - **Statistics**: per-shard sizes, and operation counters with `metrics`
//!
//! ## Example
//!
//! ```rust
//! use cmap::ShardedMap;
//! use std::sync::Arc;
//!
//! let map = Arc::new(ShardedMap::new());
//!
//! map.set("a", 1);
//! map.set("b", 2);
//! assert_eq!(*map.get(&"a").unwrap(), 1);
//!
//! // Atomic read-modify-write within the key's shard.
//! map.update("a", |old| old.copied().unwrap_or(0) + 10);
//! assert_eq!(*map.get(&"a").unwrap(), 11);
//!
//! // Stream every entry; dropping the stream early cancels it.
//! let mut total = 0;
//! for (_key, value) in Arc::clone(&map).iterate(16) {
//!     total += *value;
//! }
//! assert_eq!(total, 13);
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use cmap::ShardedMapBuilder;
//!
//! let map = ShardedMapBuilder::new()
//!     .shard_count(32)?  // Must be power of two
//!     .capacity_per_shard(128)
//!     .build::<String, i32>();
//! assert_eq!(map.num_shards(), 32);
//! # Ok::<(), cmap::Error>(())
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

/// Configuration and builder types.
pub mod config;
/// Error types.
pub mod error;
pub mod hash;
/// Streaming iteration over a map.
pub mod iter;
pub mod queue;
/// Internal shard implementation.
mod shard;
/// Main ShardedMap implementation.
pub mod shardmap;
pub mod stats;

// Re-export main types
pub use config::{Config, ShardedMapBuilder, Transport, DEFAULT_SHARD_COUNT};
pub use error::Error;
pub use hash::{DisplayHasher, FloatKey, Hashable, KeyHasher, ShardKey, TypeHasher};
pub use iter::{CancelHandle, Stream};
pub use queue::{RingQueue, SendError};
pub use shardmap::ShardedMap;
pub use stats::{ShardOps, Stats};
