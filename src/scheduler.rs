//! Timer-driven flush workers.
//!
//! Each worker thread owns a disjoint partition of the shard range
//! (`idx % num_workers == worker`), so no two loops ever contend for the
//! same shard's data.  The wake channel doubles as the shutdown signal:
//! a worker flushes when `recv_timeout` elapses and exits as soon as the
//! sender side speaks or disappears, or once the shared cancellation
//! token has fired.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::aggregator::Aggregator;
use crate::cancel::CancelToken;

// ---------------------------------------------------------------------------
// FlushScheduler
// ---------------------------------------------------------------------------

/// Handle over the background flush loops.
///
/// Worker count and interval are fixed at start.  Dropping the handle
/// without calling [`shutdown`](FlushScheduler::shutdown) still stops the
/// loops (their wake channels close) but does not wait for them.
pub struct FlushScheduler {
    cancel: CancelToken,
    workers: Vec<Worker>,
}

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl FlushScheduler {
    /// Starts `num_workers` flush loops, each firing every `interval`.
    pub fn start(aggregator: Arc<Aggregator>, num_workers: usize, interval: Duration) -> Self {
        assert!(num_workers > 0, "num_workers must be greater than 0");
        let cancel = CancelToken::new();
        let workers = (0..num_workers)
            .map(|worker| {
                let aggregator = Arc::clone(&aggregator);
                let cancel = cancel.clone();
                let (stop, wake) = mpsc::channel::<()>();
                let handle = thread::spawn(move || {
                    debug!(worker, "flush worker started");
                    loop {
                        match wake.recv_timeout(interval) {
                            // Nothing arrived within the interval: a tick.
                            // A fired token means shutdown is underway; do
                            // not drain into a sink that will refuse the
                            // batch — the counts would be lost.
                            Err(RecvTimeoutError::Timeout) => {
                                if cancel.is_cancelled() {
                                    break;
                                }
                                aggregator.flush_partition(&cancel, worker, num_workers);
                            }
                            // Shutdown.  Any tick that was mid-flush has
                            // already completed above.
                            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                    debug!(worker, "flush worker stopped");
                });
                Worker { stop, handle }
            })
            .collect();

        FlushScheduler { cancel, workers }
    }

    /// The process-wide cancellation signal shared with every flush and,
    /// through it, every sink call.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Stops every worker and waits for them to exit.
    ///
    /// Cooperative: a worker that is mid-flush finishes that flush call
    /// first; a sink call still in flight sees the fired token and is
    /// expected to return promptly on its own.
    pub fn shutdown(self) {
        self.cancel.cancel();
        for worker in &self.workers {
            let _ = worker.stop.send(());
        }
        for worker in self.workers {
            let _ = worker.handle.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
