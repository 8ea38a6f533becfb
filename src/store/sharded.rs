use std::mem;

use ahash::{AHashMap, RandomState};
use parking_lot::Mutex;

/// Identifier of a counted entity (e.g. a banner).
///
/// Opaque to the store: any value is accepted, no existence check is made.
pub type Key = u64;

/// Per-key accumulated counts, as held live in a shard and as handed out
/// by a drain.
pub type CounterMap = AHashMap<Key, u64>;

// ---------------------------------------------------------------------------
// Shard
// ---------------------------------------------------------------------------

/// Cache-line padding to prevent false sharing between shards.
#[repr(align(64))]
pub(crate) struct Shard {
    counts: Mutex<CounterMap>,
}

impl Shard {
    fn new() -> Self {
        Shard {
            counts: Mutex::new(CounterMap::new()),
        }
    }

    /// Adds 1 to `key`'s accumulator, initializing it to 1 if absent.
    ///
    /// The lock is held for a single map write and released on every exit
    /// path.  Never fails.
    #[inline]
    pub(crate) fn increment(&self, key: Key) {
        *self.counts.lock().entry(key).or_insert(0) += 1;
    }

    /// Swaps the live map for a fresh empty one and returns the old map.
    ///
    /// The critical section is strictly the swap — never iterate-and-copy —
    /// so lock hold time is O(1) regardless of how many keys accumulated.
    /// Writers are therefore never blocked by the cost of serializing or
    /// persisting a snapshot.
    ///
    /// Ownership of the snapshot transfers fully to the caller; the shard
    /// keeps no reference to it.  An increment racing this call lands
    /// either in the returned snapshot or in the fresh map seen by the
    /// next drain — never in both, never in neither.
    pub(crate) fn drain(&self) -> CounterMap {
        mem::take(&mut *self.counts.lock())
    }

    pub(crate) fn len(&self) -> usize {
        self.counts.lock().len()
    }
}

// ---------------------------------------------------------------------------
// ShardedCounters
// ---------------------------------------------------------------------------

/// A write-only counter store backed by `N` independently-locked shards.
///
/// There is no global lock anywhere on the write path; contention is
/// bounded by `1/N` of total traffic under a uniform key distribution.
/// The shard count is fixed at construction and never changes for the
/// store's lifetime — routing correctness depends on that invariant.
pub struct ShardedCounters {
    shards: Box<[Shard]>,
    /// Hasher used only to compute shard indices.  Seeded once, so routing
    /// is stable for the lifetime of this instance.
    build_hasher: RandomState,
}

impl ShardedCounters {
    /// Creates a store with `num_shards` independently-locked shards.
    pub fn new(num_shards: usize) -> Self {
        assert!(num_shards > 0, "num_shards must be greater than 0");
        let shards = (0..num_shards)
            .map(|_| Shard::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        ShardedCounters {
            shards,
            build_hasher: RandomState::new(),
        }
    }

    /// Deterministic shard index for `key`.  Pure, O(1), never blocks.
    #[inline]
    pub fn shard_of(&self, key: Key) -> usize {
        let h = self.build_hasher.hash_one(key);
        // Use the high bits (better avalanche from ahash).
        ((h >> 32) as usize) % self.shards.len()
    }

    /// Adds one click for `key` on its owning shard.
    #[inline]
    pub fn increment(&self, key: Key) {
        self.shards[self.shard_of(key)].increment(key);
    }

    /// Drains shard `idx`, returning its accumulated counts and leaving
    /// the shard empty.
    pub fn drain_shard(&self, idx: usize) -> CounterMap {
        self.shards[idx].drain()
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Total number of live keys across all shards (locks each shard
    /// briefly; diagnostic only).
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.len() == 0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
