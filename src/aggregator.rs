use std::sync::Arc;

use jiff::Timestamp;
use tracing::warn;

use crate::builder::AggregatorBuilder;
use crate::cancel::CancelToken;
use crate::metrics::stats::{FlushMetrics, FlushStatsCounter};
use crate::sink::{minute_bucket, Sink};
use crate::store::sharded::{Key, ShardedCounters};

/// Source of flush-time timestamps.  Injectable so tests can pin minute
/// boundaries; production uses [`Timestamp::now`].
pub(crate) type Clock = Box<dyn Fn() -> Timestamp + Send + Sync>;

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// The write-side usecase: absorbs concurrent increments into the sharded
/// cache and, on each flush, hands accumulated counts to the persistence
/// sink bucketed by the minute the flush runs in.
///
/// Durability is at-most-once by design: once a shard is drained its
/// counts exist only in the snapshot, and a snapshot whose sink call fails
/// is dropped — never retried, never re-buffered.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use clicktally::{Aggregator, CancelToken, MemorySink};
///
/// let sink = Arc::new(MemorySink::new());
/// let aggregator = Aggregator::builder().num_shards(8).build(sink);
/// aggregator.increment(42);
/// aggregator.flush(&CancelToken::new());
/// ```
pub struct Aggregator {
    counters: ShardedCounters,
    sink: Arc<dyn Sink>,
    clock: Clock,
    metrics: FlushStatsCounter,
}

impl Aggregator {
    pub(crate) fn new(num_shards: usize, sink: Arc<dyn Sink>, clock: Clock) -> Self {
        Aggregator {
            counters: ShardedCounters::new(num_shards),
            sink,
            clock,
            metrics: FlushStatsCounter::new(),
        }
    }

    /// Returns an [`AggregatorBuilder`] for configuring a new aggregator.
    pub fn builder() -> AggregatorBuilder {
        AggregatorBuilder::new()
    }

    // -----------------------------------------------------------------------
    // Hot-path: increment
    // -----------------------------------------------------------------------

    /// Adds one click for `key`.
    ///
    /// Never fails and never blocks beyond the owning shard's O(1)
    /// critical section; in particular it is never blocked by an in-flight
    /// persistence call.
    #[inline]
    pub fn increment(&self, key: Key) {
        self.counters.increment(key);
    }

    // -----------------------------------------------------------------------
    // Flush path
    // -----------------------------------------------------------------------

    /// Drains every shard and persists each non-empty snapshot.
    pub fn flush(&self, cancel: &CancelToken) {
        self.flush_partition(cancel, 0, 1);
    }

    /// Flushes the shards owned by `worker` out of `num_workers` disjoint
    /// partitions (`idx % num_workers == worker`).
    ///
    /// Scheduler workers each own a non-overlapping subset, so no two
    /// loops ever race to claim the same shard's data.  Each shard is
    /// processed independently: drained under its own lock (an O(1) swap),
    /// then persisted with no lock held.
    pub fn flush_partition(&self, cancel: &CancelToken, worker: usize, num_workers: usize) {
        assert!(
            num_workers > 0 && worker < num_workers,
            "worker {worker} out of range for {num_workers} partitions"
        );
        self.metrics.record_flush();
        for idx in (worker..self.counters.num_shards()).step_by(num_workers) {
            self.flush_shard(cancel, idx);
        }
    }

    fn flush_shard(&self, cancel: &CancelToken, idx: usize) {
        let snapshot = self.counters.drain_shard(idx);
        // Idle shards cost nothing: no sink call for an empty snapshot.
        if snapshot.is_empty() {
            return;
        }

        // Bucketing is evaluated here, not at increment time: every entry
        // of this batch lands in the minute the flush runs in, even ones
        // incremented just before a minute boundary.
        let bucket = minute_bucket((self.clock)());
        match self.sink.batch_upsert(cancel, bucket, &snapshot) {
            Ok(()) => self.metrics.record_batch(snapshot.len() as u64),
            Err(error) => {
                // At-most-once: the drained counts are dropped, and the
                // remaining shards still get their attempt.
                self.metrics.record_failure(snapshot.len() as u64);
                warn!(
                    shard = idx,
                    keys = snapshot.len(),
                    %error,
                    "batch upsert failed; dropping drained counts"
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Point-in-time flush-pipeline statistics.
    pub fn stats(&self) -> FlushMetrics {
        self.metrics.snapshot()
    }

    /// Number of keys currently buffered in memory awaiting a flush.
    pub fn pending_keys(&self) -> usize {
        self.counters.len()
    }

    pub fn num_shards(&self) -> usize {
        self.counters.num_shards()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
