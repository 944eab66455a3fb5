//! Cooperative cancellation tokens
//!
//! A `CancelToken` is shared between a future value and the operation
//! computing it. Cancellation never preempts: tripping the token only makes
//! `is_cancelled` observable, and the operation's own polling decides whether
//! work actually stops. Tokens optionally carry a deadline; once the deadline
//! passes the token reads as cancelled without anyone calling `cancel`.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    deadline: Mutex<Option<Instant>>,
}

/// Shared cooperative cancellation flag with an optional deadline
///
/// Clones share state. Checking is lock-free on the hot path; the deadline
/// lock is only taken when a deadline has been armed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    /// Fresh, untripped token with no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the token. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    /// True once the token is tripped or its deadline has passed
    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return true;
        }
        match *self.inner.deadline.lock() {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// Arm a deadline `timeout` from now
    ///
    /// A later call replaces the previous deadline; the earliest observed
    /// expiry still wins for `is_cancelled` because expiry is evaluated
    /// against the stored instant on every check.
    pub fn set_deadline(&self, timeout: Duration) {
        *self.inner.deadline.lock() = Some(Instant::now() + timeout);
    }

    /// The armed deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        *self.inner.deadline.lock()
    }

    /// Time remaining until the deadline; None when no deadline is armed
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}
