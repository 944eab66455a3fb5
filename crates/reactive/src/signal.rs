//! Change notifications
//!
//! A `Signal` records one successful variable access: who changed, what kind
//! of access, the value before and after, and the binding version the write
//! produced. Signals are dispatched synchronously on the writer's execution
//! path, in listener registration order.

use crate::scope::ScopeId;
use chrono::{DateTime, Utc};
use rill_core::{AccessKind, Value, VarKey};

/// One successful variable change, as delivered to listeners
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    /// Scope owning the binding that changed
    pub scope: ScopeId,
    /// Key of the binding
    pub key: VarKey,
    /// What happened (declare, write, or a re-notification read)
    pub access: AccessKind,
    /// Stored value before the change; None on declaration
    pub old: Option<Value>,
    /// Stored value after the change
    pub new: Value,
    /// Binding version after the change (1 on declaration)
    pub version: u64,
    /// Wall-clock dispatch time
    pub at: DateTime<Utc>,
}

impl Signal {
    /// True when the value actually changed (re-notifications carry
    /// `old == new`)
    pub fn changed(&self) -> bool {
        self.old.as_ref() != Some(&self.new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_changed() {
        let signal = Signal {
            scope: ScopeId::from_uuid(Uuid::nil()),
            key: VarKey::new("x"),
            access: AccessKind::Write,
            old: Some(Value::Int(1)),
            new: Value::Int(1),
            version: 2,
            at: Utc::now(),
        };
        assert!(!signal.changed());

        let declared = Signal {
            old: None,
            ..signal.clone()
        };
        assert!(declared.changed());
    }
}
