//! Persistence boundary — the durable store the flush pipeline hands
//! drained snapshots to, and the read path serving historical statistics.
//!
//! The core only ever talks to these traits; the production deployment
//! plugs in a database-backed implementation whose upsert merges by
//! addition (`ON CONFLICT (key, ts) DO UPDATE SET v = v + EXCLUDED.v`).
//! [`MemorySink`] ships the same contract in-process for tests and demos.

use std::collections::BTreeMap;

use jiff::Timestamp;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::CancelToken;
use crate::store::sharded::{CounterMap, Key};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure surfaced by a [`Sink`] or [`StatsReader`] call.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The shared cancellation signal fired while the call was in flight.
    #[error("operation cancelled")]
    Cancelled,
    /// The backing store rejected or failed the operation.
    #[error("backend failure: {0}")]
    Backend(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Bucket records
// ---------------------------------------------------------------------------

/// One persisted aggregation unit: a (key, minute) bucket and its value.
///
/// Uniquely identified by `(key, ts)`; repeated writes to the same bucket
/// merge by addition, never overwrite.  Serializes to the service's wire
/// shape `{"ts": RFC3339, "v": n}` — the key travels in the request path,
/// not the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRecord {
    #[serde(skip)]
    pub key: Key,
    pub ts: Timestamp,
    #[serde(rename = "v")]
    pub value: u64,
}

/// Truncates `ts` to the start of the minute containing it.
pub fn minute_bucket(ts: Timestamp) -> Timestamp {
    let secs = ts.as_second() - ts.as_second().rem_euclid(60);
    // Whole-minute seconds are in range for any valid timestamp.
    Timestamp::from_second(secs).unwrap_or(ts)
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Durable store for aggregated counts.
///
/// `batch_upsert` must merge by addition against any existing value for
/// the same (key, bucket) pair — never last-write-wins — and must treat
/// the whole snapshot as one logical operation.  Every entry of a given
/// call shares a single bucket timestamp: the minute the *flush* ran in,
/// not the minutes the increments happened in.
///
/// Implementations doing slow I/O should poll `cancel` and return
/// [`SinkError::Cancelled`] promptly once shutdown begins.  No shard lock
/// is ever held across this call.
pub trait Sink: Send + Sync + 'static {
    fn batch_upsert(
        &self,
        cancel: &CancelToken,
        bucket: Timestamp,
        counts: &CounterMap,
    ) -> Result<(), SinkError>;
}

/// Read path over persisted buckets.  Bypasses the in-memory cache
/// entirely.
pub trait StatsReader: Send + Sync {
    /// All buckets for `key` with `from <= ts <= to`, ascending by `ts`.
    fn stats(&self, key: Key, from: Timestamp, to: Timestamp)
        -> Result<Vec<BucketRecord>, SinkError>;
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// In-process reference sink: an ordered map keyed by (key, bucket).
#[derive(Default)]
pub struct MemorySink {
    buckets: Mutex<BTreeMap<(Key, Timestamp), u64>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct (key, bucket) records held.
    pub fn record_count(&self) -> usize {
        self.buckets.lock().len()
    }
}

impl Sink for MemorySink {
    fn batch_upsert(
        &self,
        cancel: &CancelToken,
        bucket: Timestamp,
        counts: &CounterMap,
    ) -> Result<(), SinkError> {
        if cancel.is_cancelled() {
            return Err(SinkError::Cancelled);
        }
        let mut buckets = self.buckets.lock();
        for (&key, &value) in counts {
            *buckets.entry((key, bucket)).or_insert(0) += value;
        }
        Ok(())
    }
}

impl StatsReader for MemorySink {
    fn stats(
        &self,
        key: Key,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<BucketRecord>, SinkError> {
        // An inverted interval selects nothing; BTreeMap::range panics on
        // a reversed range instead.
        if from > to {
            return Ok(Vec::new());
        }
        // BTreeMap iteration order gives ascending `ts` within one key.
        Ok(self
            .buckets
            .lock()
            .range((key, from)..=(key, to))
            .map(|(&(key, ts), &value)| BucketRecord { key, ts, value })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
