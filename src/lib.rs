//! Rill - reactive execution substrate for a dynamically-typed expression
//! language
//!
//! Rill is the runtime an expression-language front end plugs into: an
//! immutable tagged value model, a guarded reactive scope chain, and an
//! asynchronous execution engine with single-assignment futures,
//! cooperative cancellation, and timed scheduling.
//!
//! # Quick Start
//!
//! ```
//! use rill::{FnOperation, Runtime, Value};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let runtime = Runtime::with_defaults();
//!
//! let add = Arc::new(FnOperation::ready("add", |inputs: &[Value]| {
//!     inputs.iter().fold(Value::Int(0), |acc, v| &acc + v)
//! }));
//! let future = runtime.submit(add, vec![Value::Int(2), Value::Int(3)]);
//!
//! assert_eq!(
//!     future.wait_timeout(Duration::from_secs(2)).unwrap().value(),
//!     Some(&Value::Int(5))
//! );
//! runtime.shutdown(Duration::from_secs(1));
//! ```
//!
//! # Architecture
//!
//! The workspace splits along the component seams: `rill-core` holds the
//! value model, guards, and execution traits; `rill-reactive` the scope
//! chain and listeners; `rill-engine` the executor, scheduler, and resource
//! handlers. This crate re-exports the public surface of all three.

// Re-export the public API of the member crates
pub use rill_core::*;
pub use rill_engine::*;
pub use rill_reactive::*;
