//! Load simulation: concurrent writers against the scheduler-driven
//! flush pipeline, persisting into the in-process reference sink.
//!
//! Keys follow a Zipf(s=1.0) distribution, so a handful of "banners" take
//! most of the clicks — the workload the sharded layout exists for.
//!
//! Run with:
//!     cargo run --example simulate --release

use std::sync::Arc;
use std::time::{Duration, Instant};

use clicktally::{Aggregator, CancelToken, FlushScheduler, MemorySink, StatsReader};
use jiff::Timestamp;

/// Key universe size (number of distinct banners).
const POOL: usize = 10_000;
/// Concurrent writer threads.
const WRITERS: usize = 8;
/// Clicks issued by each writer.
const CLICKS_PER_WRITER: usize = 500_000;
/// Scheduler configuration.
const FLUSH_WORKERS: usize = 2;
const FLUSH_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Zipf(s=1.0) sampler — no external dependency required.
//
// Inverse-CDF derivation:
//   P(X ≤ k) ≈ ln(k) / ln(N)   for large N
//   ⟹  k = N^u  where u ~ Uniform[0,1]
// ---------------------------------------------------------------------------

struct Xorshift64(u64);

impl Xorshift64 {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    /// Returns a uniform float in (0, 1].
    fn uniform(&mut self) -> f64 {
        let bits = self.next() >> 11;
        (bits + 1) as f64 / (1u64 << 53) as f64
    }

    /// Zipf(s=1) sample in [0, pool).
    fn zipf(&mut self, pool: usize) -> usize {
        let u = self.uniform();
        let k = (pool as f64).powf(u) as usize;
        k.saturating_sub(1).min(pool - 1)
    }
}

fn main() {
    let sink = Arc::new(MemorySink::new());
    let aggregator = Arc::new(Aggregator::builder().build(sink.clone()));
    let scheduler = FlushScheduler::start(Arc::clone(&aggregator), FLUSH_WORKERS, FLUSH_INTERVAL);

    println!(
        "simulating {} writers x {} clicks over {} keys ({} shards, {} flush workers @ {:?})",
        WRITERS,
        CLICKS_PER_WRITER,
        POOL,
        aggregator.num_shards(),
        FLUSH_WORKERS,
        FLUSH_INTERVAL,
    );

    let started = Instant::now();
    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let a = Arc::clone(&aggregator);
            std::thread::spawn(move || {
                let mut rng = Xorshift64(0x9E37_79B9 + w as u64);
                for _ in 0..CLICKS_PER_WRITER {
                    a.increment(rng.zipf(POOL) as u64);
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }
    let write_elapsed = started.elapsed();

    scheduler.shutdown();
    // Pick up whatever the last tick left behind.
    aggregator.flush(&CancelToken::new());

    let total_clicks = (WRITERS * CLICKS_PER_WRITER) as f64;
    println!(
        "writes:  {:.1}M clicks in {:.2?}  ({:.1}M clicks/s)",
        total_clicks / 1e6,
        write_elapsed,
        total_clicks / write_elapsed.as_secs_f64() / 1e6,
    );

    let stats = aggregator.stats();
    println!(
        "flushes: {} cycles, {} batches, {} failures, {} keys persisted",
        stats.flushes, stats.batches, stats.failures, stats.keys_flushed,
    );
    println!("sink:    {} bucket records", sink.record_count());

    // Rank-frequency check: the hottest banners should dwarf the tail.
    let mut persisted: u64 = 0;
    let mut top: Vec<(u64, u64)> = Vec::new();
    for key in 0..POOL as u64 {
        let clicks: u64 = sink
            .stats(key, Timestamp::MIN, Timestamp::MAX)
            .unwrap()
            .iter()
            .map(|r| r.value)
            .sum();
        persisted += clicks;
        top.push((key, clicks));
    }
    top.sort_by_key(|&(_, v)| std::cmp::Reverse(v));

    assert_eq!(persisted as f64, total_clicks, "no click may be lost in-process");
    println!("top banners:");
    for (key, clicks) in top.iter().take(5) {
        println!("  banner {key:>5}: {clicks} clicks");
    }
}
