//! Error types for the Rill substrate
//!
//! Two distinct channels run through the whole system:
//!
//! - **Value-level errors** (recoverable data): [`ErrorValue`] rides inside a
//!   `Value::Error` and propagates by ordinary data flow. Coercion failures,
//!   guard rejections surfaced as data, and operation-level business failures
//!   all live here.
//! - **Fatal signals** (unrecoverable): [`Fault`] marks a broken internal
//!   invariant - double settlement, listener reentrancy, a dangling parent
//!   scope. A fault never unwinds across the engine; the future tied to the
//!   offending operation settles `Failed` and the fault is reported to the
//!   host.
//!
//! We use `thiserror` for automatic `Display` and `Error` implementations.

use crate::tag::ValueKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failed coercion between two value tags
///
/// Returned by the `to_*` accessors and by arithmetic/ordering between
/// incomparable tags. Carries the source and target tags so callers can
/// report exactly which conversion was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot coerce {from} to {to}")]
pub struct CoercionError {
    /// Tag of the value being coerced
    pub from: ValueKind,
    /// Tag the caller asked for
    pub to: ValueKind,
}

impl CoercionError {
    /// Construct a coercion error for the given source/target pair
    pub fn new(from: ValueKind, to: ValueKind) -> Self {
        Self { from, to }
    }
}

/// Category of a value-level error
///
/// The category is part of the portable encoding contract; renderings are
/// stable lowercase names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A coercion between tags was refused
    Coercion,
    /// Arithmetic failure (overflow, 0/0, inf - inf)
    Arithmetic,
    /// A guard chain rejected a candidate
    Validation,
    /// A variable reference did not resolve
    Unbound,
    /// A deadline expired before settlement
    Timeout,
    /// Work was cancelled before producing a result
    Cancelled,
    /// An external resource handler failed or the scheme is unknown
    Resource,
    /// An operation-level business failure
    Business,
    /// An internal fault surfaced as data
    Internal,
}

impl ErrorKind {
    /// Stable lowercase name used by the portable encoding
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Coercion => "coercion",
            ErrorKind::Arithmetic => "arithmetic",
            ErrorKind::Validation => "validation",
            ErrorKind::Unbound => "unbound",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Resource => "resource",
            ErrorKind::Business => "business",
            ErrorKind::Internal => "internal",
        }
    }

    /// Inverse of [`ErrorKind::name`]; None for unknown names
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "coercion" => ErrorKind::Coercion,
            "arithmetic" => ErrorKind::Arithmetic,
            "validation" => ErrorKind::Validation,
            "unbound" => ErrorKind::Unbound,
            "timeout" => ErrorKind::Timeout,
            "cancelled" => ErrorKind::Cancelled,
            "resource" => ErrorKind::Resource,
            "business" => ErrorKind::Business,
            "internal" => ErrorKind::Internal,
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An error carried as data inside a `Value::Error`
///
/// Pipelines carry these by normal data flow and decide themselves whether
/// to short-circuit. The optional cause chain is not part of the portable
/// round-trip contract.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorValue {
    /// Error category
    pub kind: ErrorKind,
    /// Human-readable description
    pub message: String,
    /// Optional upstream error this one wraps
    pub cause: Option<Box<ErrorValue>>,
}

impl ErrorValue {
    /// Construct an error value with no cause
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// Attach an upstream cause
    pub fn with_cause(mut self, cause: ErrorValue) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// The root of the cause chain (self if there is no cause)
    pub fn root_cause(&self) -> &ErrorValue {
        let mut current = self;
        while let Some(cause) = &current.cause {
            current = cause;
        }
        current
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by {cause})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorValue {}

impl From<CoercionError> for ErrorValue {
    fn from(e: CoercionError) -> Self {
        ErrorValue::new(ErrorKind::Coercion, e.to_string())
    }
}

/// Broken internal invariant
///
/// Faults are the unrecoverable channel: the engine stops the offending
/// operation (its future settles `Failed`) but keeps running. Faults are
/// never returned where a value-level error would do.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// A future received a second settlement attempt
    #[error("future already settled")]
    AlreadySettled,

    /// A listener re-entered `set` on the key it is being notified for
    #[error("listener reentrancy on variable {key}")]
    ListenerReentrancy {
        /// Rendered key of the variable under notification
        key: String,
    },

    /// An operation touched a scope after `destroy`
    #[error("scope has been destroyed")]
    ScopeDestroyed,

    /// A child scope outlived its parent
    #[error("parent scope dropped before child")]
    ParentGone,

    /// An operation panicked inside the executor
    #[error("operation panicked: {message}")]
    OperationPanic {
        /// Panic payload rendered as text
        message: String,
    },
}

impl Fault {
    /// Surface this fault as a value-level error for reporting to the host
    pub fn as_error_value(&self) -> ErrorValue {
        ErrorValue::new(ErrorKind::Internal, self.to_string())
    }
}
