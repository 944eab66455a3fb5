//! Execution engine for the Rill substrate
//!
//! This crate turns operation graphs into deferred, cancellable, schedulable
//! computations:
//! - Executor: bounded worker pool settling futures, panic-isolated
//! - Scheduler: single timer source for one-shot, repeating, and deadline
//!   work, feeding the same pool
//! - Pipeline: left-to-right operation composition with suspension
//! - ResourceResolver: pluggable URI scheme → handler registry
//! - Runtime: the assembled facade hosts start from

#![warn(missing_docs)]
#![warn(clippy::all)]

// Module declarations
pub mod config;
pub mod executor;
pub mod pipeline;
pub mod resource;
pub mod runtime;
pub mod scheduler;

// Re-export commonly used types and traits
pub use config::{
    ExecutorConfig, DEFAULT_MAX_QUEUE_DEPTH, DEFAULT_SHUTDOWN_GRACE, DEFAULT_WORKERS,
};
pub use executor::{Executor, ExecutorStats};
pub use pipeline::Pipeline;
pub use resource::{
    HandlerFactory, MemoryFactory, MemoryHandler, ResourceHandler, ResourceResolver,
    SubscriberFn, SubscriptionId,
};
pub use runtime::Runtime;
pub use scheduler::{RepeatHandle, Scheduler};
