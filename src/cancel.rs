//! Process-wide cooperative cancellation.
//!
//! A [`CancelToken`] is the synchronous analogue of a cancellable request
//! context: the embedding process holds one token, hands clones to the
//! flush scheduler and the persistence sink, and fires it once at
//! shutdown.  Observation is polling-based — nothing is interrupted
//! synchronously.  An in-flight sink call receives the token and is
//! expected to notice the signal itself and return promptly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable cancellation flag shared between scheduler loops, in-flight
/// flushes, and sink calls.  All clones observe the same signal.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal.  Idempotent; cannot be un-fired.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once [`cancel`](CancelToken::cancel) has been called
    /// on any clone of this token.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
