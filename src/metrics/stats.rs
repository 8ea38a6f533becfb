use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters updated by every flush cycle.
pub struct FlushStatsCounter {
    flushes: AtomicU64,
    batches: AtomicU64,
    failures: AtomicU64,
    keys_flushed: AtomicU64,
    keys_dropped: AtomicU64,
}

impl FlushStatsCounter {
    pub fn new() -> Self {
        FlushStatsCounter {
            flushes: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            keys_flushed: AtomicU64::new(0),
            keys_dropped: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_batch(&self, keys: u64) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.keys_flushed.fetch_add(keys, Ordering::Relaxed);
    }

    /// A batch the sink rejected; its `keys` drained counts are gone.
    #[inline]
    pub fn record_failure(&self, keys: u64) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.keys_dropped.fetch_add(keys, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of the statistics.
    pub fn snapshot(&self) -> FlushMetrics {
        let flushes = self.flushes.load(Ordering::Relaxed);
        let batches = self.batches.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let keys_flushed = self.keys_flushed.load(Ordering::Relaxed);
        let keys_dropped = self.keys_dropped.load(Ordering::Relaxed);
        let attempts = batches + failures;
        let failure_rate = if attempts == 0 {
            0.0_f64
        } else {
            failures as f64 / attempts as f64
        };
        FlushMetrics {
            flushes,
            batches,
            failures,
            keys_flushed,
            keys_dropped,
            failure_rate,
        }
    }
}

impl Default for FlushStatsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of flush-pipeline statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushMetrics {
    /// Number of flush cycles started (including ones that drained nothing).
    pub flushes: u64,
    /// Number of non-empty snapshots the sink accepted.
    pub batches: u64,
    /// Number of non-empty snapshots the sink rejected.
    pub failures: u64,
    /// Distinct keys across all accepted batches.
    pub keys_flushed: u64,
    /// Distinct keys whose drained counts were lost to rejected batches.
    pub keys_dropped: u64,
    /// `failures / (batches + failures)`, or `0.0` if nothing was attempted.
    pub failure_rate: f64,
}

impl FlushMetrics {
    pub fn attempt_count(&self) -> u64 {
        self.batches + self.failures
    }
}
