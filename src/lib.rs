mod aggregator;
mod builder;
mod metrics;
mod scheduler;
mod store;

pub mod cancel;
pub mod sink;

pub use aggregator::Aggregator;
pub use builder::AggregatorBuilder;
pub use cancel::CancelToken;
pub use metrics::stats::FlushMetrics;
pub use scheduler::FlushScheduler;
pub use sink::{minute_bucket, BucketRecord, MemorySink, Sink, SinkError, StatsReader};
pub use store::sharded::{CounterMap, Key, ShardedCounters};
