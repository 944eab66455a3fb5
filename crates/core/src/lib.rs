//! Core types and traits for the Rill substrate
//!
//! This crate defines the foundational pieces used throughout the system:
//! - Value: immutable tagged dynamic value, the unit of all computation
//! - ValueKind: the closed tag set
//! - ErrorValue / Fault: the two error channels (data vs fatal signal)
//! - VarKey / VarFlags: variable identities and binding flags
//! - Guard / GuardChain: composable contract enforcement around access
//! - FutureValue / CancelToken: single-assignment results and cooperative
//!   cancellation
//! - Operation: the unit-of-computation trait the engine executes

#![warn(missing_docs)]
#![warn(clippy::all)]

// Module declarations
pub mod cancel;
mod coerce;
pub mod error;
pub mod future;
pub mod guard;
pub mod key;
pub mod operation;
pub mod portable;
pub mod tag;
pub mod value;

// Re-export commonly used types and traits
pub use cancel::CancelToken;
pub use error::{CoercionError, ErrorKind, ErrorValue, Fault};
pub use future::{FutureState, FutureValue, SettleOutcome, Settled};
pub use guard::{
    AccessKind, ConstraintViolation, Guard, GuardCandidate, GuardChain, GuardChainBuilder,
    GuardVerdict,
};
pub use key::{VarFlags, VarKey};
pub use operation::{FnOperation, Invoked, OpContext, Operation};
pub use tag::ValueKind;
pub use value::{LambdaValue, Value, ValueMap, ValueRange, ValueUri};
