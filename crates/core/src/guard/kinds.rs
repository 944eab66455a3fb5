//! The standard guard set
//!
//! Each guard is a small unit struct implementing one capability. A value
//! counts as a *variable reference* when it is a `var:` scheme URI
//! (`var:name`), the form the expression layer emits for first-class
//! references to bindings.

use super::{AccessKind, Guard, GuardCandidate, GuardVerdict};
use crate::value::Value;

fn is_variable_ref(value: &Value) -> bool {
    matches!(value, Value::Uri(uri) if uri.scheme == "var" && !uri.path.is_empty())
}

/// Rejects null and void candidates
#[derive(Debug, Clone, Copy, Default)]
pub struct NotNull;

impl Guard for NotNull {
    fn name(&self) -> &'static str {
        "not-null"
    }

    fn evaluate(&self, candidate: &GuardCandidate<'_>) -> GuardVerdict {
        if candidate.value.is_nothing() {
            GuardVerdict::reject(format!("value is {}", candidate.value.kind()))
        } else {
            GuardVerdict::Accept
        }
    }
}

/// Rejects collections containing null or void elements
///
/// Non-collection candidates pass; pair with [`NotNull`] to also refuse a
/// null candidate itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotNullElements;

impl Guard for NotNullElements {
    fn name(&self) -> &'static str {
        "not-null-elements"
    }

    fn evaluate(&self, candidate: &GuardCandidate<'_>) -> GuardVerdict {
        let items = match candidate.value {
            Value::List(items) | Value::Block(items) => items,
            _ => return GuardVerdict::Accept,
        };
        match items.iter().position(Value::is_nothing) {
            Some(index) => GuardVerdict::reject(format!("element {index} is null")),
            None => GuardVerdict::Accept,
        }
    }
}

/// Rejects maps containing null or void values
#[derive(Debug, Clone, Copy, Default)]
pub struct NotNullMapValues;

impl Guard for NotNullMapValues {
    fn name(&self) -> &'static str {
        "not-null-map-values"
    }

    fn evaluate(&self, candidate: &GuardCandidate<'_>) -> GuardVerdict {
        let map = match candidate.value {
            Value::Map(map) => map,
            _ => return GuardVerdict::Accept,
        };
        for (key, value) in map.iter() {
            if value.is_nothing() {
                return GuardVerdict::reject(format!("value for key {key} is null"));
            }
        }
        GuardVerdict::Accept
    }
}

/// Requires the accessed key to name a variable properly
///
/// Refuses empty and all-whitespace names - the shape a broken computed key
/// collapses to.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyIsVariableRef;

impl Guard for KeyIsVariableRef {
    fn name(&self) -> &'static str {
        "key-is-variable-ref"
    }

    fn evaluate(&self, candidate: &GuardCandidate<'_>) -> GuardVerdict {
        let name = candidate.key.name.trim();
        if name.is_empty() {
            GuardVerdict::reject("key has no name")
        } else {
            GuardVerdict::Accept
        }
    }
}

/// Requires the candidate value to be a `var:` reference
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueIsVariableRef;

impl Guard for ValueIsVariableRef {
    fn name(&self) -> &'static str {
        "value-is-variable-ref"
    }

    fn evaluate(&self, candidate: &GuardCandidate<'_>) -> GuardVerdict {
        if is_variable_ref(candidate.value) {
            GuardVerdict::Accept
        } else {
            GuardVerdict::reject(format!(
                "expected a var: reference, got {}",
                candidate.value.kind()
            ))
        }
    }
}

/// Restricts declarable outputs to variable references
///
/// Only declarations are inspected: an operation whose outputs are guarded
/// by this may declare nothing but `var:` references. Reads and writes pass
/// untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReturnOnlyVariables;

impl Guard for ReturnOnlyVariables {
    fn name(&self) -> &'static str {
        "return-only-variables"
    }

    fn evaluate(&self, candidate: &GuardCandidate<'_>) -> GuardVerdict {
        if candidate.access != AccessKind::Declare || is_variable_ref(candidate.value) {
            GuardVerdict::Accept
        } else {
            GuardVerdict::reject(format!(
                "declared output must be a var: reference, got {}",
                candidate.value.kind()
            ))
        }
    }
}

/// Set-only semantics: after the first assignment the value is frozen
///
/// Rewriting the identical value is allowed (idempotent writes pass);
/// anything else is refused once a prior value exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOnce;

impl Guard for WriteOnce {
    fn name(&self) -> &'static str {
        "write-once"
    }

    fn evaluate(&self, candidate: &GuardCandidate<'_>) -> GuardVerdict {
        match candidate.prior {
            Some(prior) if candidate.access == AccessKind::Write && prior != candidate.value => {
                GuardVerdict::reject("value is write-once and already set")
            }
            _ => GuardVerdict::Accept,
        }
    }
}
