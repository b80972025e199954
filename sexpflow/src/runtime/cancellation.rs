//! Cooperative cancellation for long-running evaluations.
//!
//! A [`CancellationToken`] is shared between the driver and the evaluator.
//! The evaluator polls it between evaluation steps and around every external
//! invocation; external systems receive the same token so they can abandon
//! outstanding work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that cancels itself once `deadline` has passed.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            inner: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                deadline: Some(deadline),
            }),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Why the token is cancelled, or `None` while it is still live.
    pub fn reason(&self) -> Option<&'static str> {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return Some("cancelled by caller");
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some("deadline exceeded"),
            _ => None,
        }
    }
}
