use std::sync::Arc;
use std::thread;

use jiff::Timestamp;

use crate::aggregator::{Aggregator, Clock};
use crate::sink::Sink;

/// Builder for configuring and constructing an [`Aggregator`].
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use clicktally::{Aggregator, MemorySink};
///
/// let aggregator = Aggregator::builder()
///     .num_shards(128)
///     .build(Arc::new(MemorySink::new()));
/// ```
pub struct AggregatorBuilder {
    num_shards: usize,
    clock: Clock,
}

impl AggregatorBuilder {
    pub fn new() -> Self {
        AggregatorBuilder {
            num_shards: default_num_shards(),
            clock: Box::new(Timestamp::now),
        }
    }

    /// Set the number of shards (default: 2 × available parallelism).
    ///
    /// Fixed for the aggregator's lifetime.  More shards lower per-shard
    /// contention under skewed traffic at the cost of more, smaller flush
    /// batches.
    pub fn num_shards(mut self, n: usize) -> Self {
        assert!(n > 0, "num_shards must be greater than 0");
        self.num_shards = n;
        self
    }

    /// Replace the flush-time clock.
    ///
    /// Bucket timestamps are taken from this clock at flush time; tests
    /// inject a fixed clock to pin minute boundaries.
    pub fn clock<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Timestamp + Send + Sync + 'static,
    {
        self.clock = Box::new(f);
        self
    }

    pub fn build(self, sink: Arc<dyn Sink>) -> Aggregator {
        Aggregator::new(self.num_shards, sink, self.clock)
    }
}

impl Default for AggregatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Two shards per hardware thread: low per-shard contention without
/// fragmenting memory excessively.
fn default_num_shards() -> usize {
    thread::available_parallelism().map(|n| n.get() * 2).unwrap_or(8)
}
