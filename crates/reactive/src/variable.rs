//! Guarded storage cells
//!
//! A `Variable` is one named slot: the current value, the guard chain every
//! access runs through, the binding flags, and a monotonically increasing
//! version. Variables are owned by exactly one scope and only mutated under
//! that scope's write serialization.

use chrono::{DateTime, Utc};
use rill_core::{
    AccessKind, ConstraintViolation, GuardCandidate, GuardChain, Value, VarFlags, VarKey,
};

/// A named, guarded storage cell for one value
#[derive(Debug, Clone)]
pub struct Variable {
    value: Value,
    constraint: GuardChain,
    flags: VarFlags,
    version: u64,
    declared_at: DateTime<Utc>,
}

impl Variable {
    /// New cell holding `value`, already past its declare-time guard check
    pub fn new(value: Value, constraint: GuardChain, flags: VarFlags) -> Self {
        Self {
            value,
            constraint,
            flags,
            version: 1,
            declared_at: Utc::now(),
        }
    }

    /// Current value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Binding flags
    pub fn flags(&self) -> VarFlags {
        self.flags
    }

    /// Attached guard chain
    pub fn constraint(&self) -> &GuardChain {
        &self.constraint
    }

    /// Version of the stored value; bumps by one per successful write
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Declaration time
    pub fn declared_at(&self) -> DateTime<Utc> {
        self.declared_at
    }

    /// Run the guard chain against a candidate write
    pub fn check_write(
        &self,
        key: &VarKey,
        candidate: &Value,
    ) -> Result<(), ConstraintViolation> {
        self.constraint.check(&GuardCandidate {
            key,
            value: candidate,
            access: AccessKind::Write,
            prior: Some(&self.value),
        })
    }

    /// Run the guard chain against the stored value as a read
    pub fn check_read(&self, key: &VarKey) -> Result<(), ConstraintViolation> {
        self.constraint.check(&GuardCandidate {
            key,
            value: &self.value,
            access: AccessKind::Read,
            prior: Some(&self.value),
        })
    }

    /// Swap in a new value, returning the old one. Guard checks are the
    /// caller's responsibility; this only performs the accepted swap.
    pub(crate) fn store(&mut self, value: Value) -> Value {
        self.version += 1;
        std::mem::replace(&mut self.value, value)
    }
}
