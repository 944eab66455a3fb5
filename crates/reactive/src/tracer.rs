//! Signal audit tracing
//!
//! The state tracer is the second optional listener collaborator: it emits
//! every signal for its keys through `tracing` for offline audit. It shares
//! the registration path with any other listener and has no effect on
//! correctness.

use crate::listener::ListenerHandle;
use crate::scope::Scope;
use rill_core::VarKey;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Listener that logs each signal at debug level
///
/// Clones share the trace counter.
#[derive(Debug, Clone, Default)]
pub struct StateTracer {
    traced: Arc<AtomicU64>,
}

impl StateTracer {
    /// Fresh tracer
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of signals traced so far
    pub fn traced(&self) -> u64 {
        self.traced.load(Ordering::Relaxed)
    }

    /// Attach to `key` on `scope`
    pub fn attach(&self, scope: &Scope, key: impl Into<VarKey>) -> ListenerHandle {
        let tracer = self.clone();
        scope.add_listener(key, move |signal| {
            tracer.traced.fetch_add(1, Ordering::Relaxed);
            debug!(
                scope = %signal.scope,
                key = %signal.key,
                access = signal.access.name(),
                old = ?signal.old,
                new = %signal.new,
                version = signal.version,
                "variable changed"
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_core::{GuardChain, Value, VarFlags};

    #[test]
    fn test_traces_every_signal() {
        let scope = Scope::root("test");
        scope
            .declare("x", Value::Int(0), GuardChain::empty(), VarFlags::default())
            .unwrap();
        let tracer = StateTracer::new();
        tracer.attach(&scope, "x");

        scope.set("x", Value::Int(1)).unwrap();
        scope.set("x", Value::Int(2)).unwrap();
        assert_eq!(tracer.traced(), 2);
    }

    #[test]
    fn test_detached_tracer_stops() {
        let scope = Scope::root("test");
        scope
            .declare("x", Value::Int(0), GuardChain::empty(), VarFlags::default())
            .unwrap();
        let tracer = StateTracer::new();
        let handle = tracer.attach(&scope, "x");
        handle.dispose();

        scope.set("x", Value::Int(1)).unwrap();
        assert_eq!(tracer.traced(), 0);
    }
}
