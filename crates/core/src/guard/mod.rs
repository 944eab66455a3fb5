//! Composable contract enforcement around variable access
//!
//! A [`Guard`] is a named, pure predicate over a candidate access: the key,
//! the candidate value, the access kind, and the prior value if one exists.
//! Guards only observe - they never transform the candidate. Ordered
//! composition into a [`GuardChain`] short-circuits on the first rejection,
//! so cheap structural checks run before expensive semantic ones.
//!
//! A rejection is data, not a thrown failure: [`ConstraintViolation`] names
//! the rejecting guard and carries the rejected candidate so callers can
//! branch on it.
//!
//! ## Module Structure
//!
//! - `chain`: ordered composition with a builder
//! - `kinds`: the standard guard set (not-null family, reference checks,
//!   write-once)

pub mod chain;
pub mod kinds;

pub use chain::{GuardChain, GuardChainBuilder};
pub use kinds::{
    KeyIsVariableRef, NotNull, NotNullElements, NotNullMapValues, ReturnOnlyVariables,
    ValueIsVariableRef, WriteOnce,
};

use crate::key::VarKey;
use crate::value::Value;
use thiserror::Error;

/// The kind of access a guard is evaluating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    /// Reading a stored value
    Read,
    /// Writing over an existing binding
    Write,
    /// Creating a binding
    Declare,
}

impl AccessKind {
    /// Lowercase rendering used in violation details
    pub fn name(&self) -> &'static str {
        match self {
            AccessKind::Read => "read",
            AccessKind::Write => "write",
            AccessKind::Declare => "declare",
        }
    }
}

/// The (key, value, access) triple a guard evaluates
///
/// `prior` is the currently stored value, present on writes and guarded
/// reads, absent on declaration.
#[derive(Debug, Clone, Copy)]
pub struct GuardCandidate<'a> {
    /// Key being accessed
    pub key: &'a VarKey,
    /// Candidate value (on reads, the stored value under inspection)
    pub value: &'a Value,
    /// What the caller is doing
    pub access: AccessKind,
    /// Stored value before this access, if the binding exists
    pub prior: Option<&'a Value>,
}

/// A guard's decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    /// The candidate passes
    Accept,
    /// The candidate is refused
    Reject {
        /// Why, phrased for the violation report
        detail: String,
    },
}

impl GuardVerdict {
    /// Shorthand for a rejection
    pub fn reject(detail: impl Into<String>) -> Self {
        GuardVerdict::Reject {
            detail: detail.into(),
        }
    }
}

/// A named, pure, stateless validator
///
/// Guards must be side-effect-free and may only observe the candidate.
pub trait Guard: Send + Sync {
    /// Stable name reported in violations
    fn name(&self) -> &'static str;

    /// Evaluate the candidate
    fn evaluate(&self, candidate: &GuardCandidate<'_>) -> GuardVerdict;
}

/// Structured result of a guard rejection
///
/// Returned (never thrown) from `set`/`declare` so callers can branch on the
/// rejecting guard and the rejected value as data.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("guard {guard} rejected {access} of {key}: {detail}")]
pub struct ConstraintViolation {
    /// Name of the rejecting guard
    pub guard: &'static str,
    /// Key the access targeted
    pub key: VarKey,
    /// Access kind that was refused
    pub access: &'static str,
    /// The guard's explanation
    pub detail: String,
    /// The candidate that was refused
    pub rejected: Value,
}
