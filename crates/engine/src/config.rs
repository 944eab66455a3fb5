//! Engine configuration
//!
//! Plain configuration structs with conservative defaults; the limits are
//! deliberate constants so hosts can reason about backpressure behavior.

use std::time::Duration;

/// Default worker thread count
pub const DEFAULT_WORKERS: usize = 4;

/// Default bound on queued (not yet running) operations
pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 1024;

/// Default grace period for draining in-flight work at shutdown
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Tuning knobs for [`crate::Executor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Worker threads in the pool
    pub workers: usize,
    /// Submissions beyond this bound fail fast instead of queueing
    pub max_queue_depth: usize,
    /// How long shutdown waits for in-flight work before cancelling
    pub shutdown_grace: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl ExecutorConfig {
    /// Override the worker count
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Override the queue bound
    pub fn max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = depth.max(1);
        self
    }

    /// Override the shutdown grace period
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}
