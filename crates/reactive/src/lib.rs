//! Reactive scope chain and guarded variables for the Rill substrate
//!
//! This crate provides the environment half of the system:
//! - Scope: chained variable environments with parent fallback
//! - Variable: guarded, versioned storage cells
//! - Signal / ListenerRegistry: synchronous change notification in
//!   registration order, with reentrancy detection
//! - TypeLearner / StateTracer: the optional listener collaborators
//! - ModuleResolver: the mounting seam for externally resolved scopes

#![warn(missing_docs)]
#![warn(clippy::all)]

// Module declarations
pub mod learner;
pub mod listener;
pub mod module;
pub mod scope;
pub mod signal;
pub mod tracer;
pub mod variable;

// Re-export commonly used types and traits
pub use learner::{TypeLearner, TypePrediction};
pub use listener::{ListenerFn, ListenerHandle, ListenerRegistry};
pub use module::{mount_module, ModuleResolver, StaticResolver};
pub use scope::{ErrorHandlerFn, Scope, ScopeId, SetError};
pub use signal::Signal;
pub use tracer::StateTracer;
pub use variable::Variable;
