//! Bundled substrate runtime
//!
//! `Runtime` wires the pieces a host otherwise assembles by hand: a root
//! scope, an executor pool, the timer scheduler, and the resource registry
//! (with `mem:` preinstalled). It is a convenience facade - every part stays
//! reachable for hosts that need direct access.

use crate::config::ExecutorConfig;
use crate::executor::Executor;
use crate::resource::ResourceResolver;
use crate::scheduler::Scheduler;
use rill_core::{FutureValue, Operation, Value};
use rill_reactive::Scope;
use std::sync::Arc;
use std::time::Duration;

/// Root scope + executor + scheduler + resources in one handle
pub struct Runtime {
    root: Scope,
    executor: Arc<Executor>,
    scheduler: Scheduler,
    resources: Arc<ResourceResolver>,
}

impl Runtime {
    /// Start a runtime per `config`
    pub fn new(config: ExecutorConfig) -> Self {
        let executor = Arc::new(Executor::new(config));
        let scheduler = Scheduler::new(Arc::clone(&executor));
        Self {
            root: Scope::root("root"),
            executor,
            scheduler,
            resources: Arc::new(ResourceResolver::with_memory()),
        }
    }

    /// Runtime with default configuration
    pub fn with_defaults() -> Self {
        Self::new(ExecutorConfig::default())
    }

    /// The root scope operations hang their bindings off
    pub fn root(&self) -> &Scope {
        &self.root
    }

    /// The worker pool
    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// The timer source
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The URI handler registry
    pub fn resources(&self) -> &Arc<ResourceResolver> {
        &self.resources
    }

    /// Submit an operation to the pool
    pub fn submit(&self, op: Arc<dyn Operation>, inputs: Vec<Value>) -> FutureValue {
        self.executor.submit(op, inputs)
    }

    /// Submit with a deadline; expiry fails the future with a timeout and
    /// trips the operation's cancellation token
    pub fn submit_with_deadline(
        &self,
        op: Arc<dyn Operation>,
        inputs: Vec<Value>,
        deadline: Duration,
    ) -> FutureValue {
        let future = self.executor.submit(op, inputs);
        self.scheduler.enforce_deadline(&future, deadline);
        future
    }

    /// Stop the scheduler, then drain and stop the pool
    ///
    /// `grace` bounds the executor drain; work still outstanding afterwards
    /// settles `Cancelled`.
    pub fn shutdown(&self, grace: Duration) {
        self.scheduler.shutdown();
        self.executor.shutdown(grace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::RepeatHandle;
    use rill_core::{ErrorKind, FnOperation, Settled};

    #[test]
    fn test_runtime_end_to_end() {
        let runtime = Runtime::with_defaults();
        runtime
            .root()
            .declare(
                "factor",
                Value::Int(3),
                rill_core::GuardChain::empty(),
                rill_core::VarFlags::default(),
            )
            .unwrap();

        // the operation captures the scope it was built against
        let scope = runtime.root().clone();
        let op: Arc<dyn Operation> = Arc::new(FnOperation::ready("scale", move |inputs| {
            match scope.lookup(&"factor".into()) {
                Some(factor) => &inputs[0] * &factor,
                None => Value::error(ErrorKind::Unbound, "factor"),
            }
        }));

        let settled = runtime
            .submit(op, vec![Value::Int(14)])
            .wait_timeout(Duration::from_secs(2));
        assert_eq!(settled, Some(Settled::Resolved(Value::Int(42))));
        runtime.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_submit_with_deadline_times_out() {
        let runtime = Runtime::with_defaults();
        let op: Arc<dyn Operation> = Arc::new(FnOperation::new("stall", |_i, cx| {
            let started = std::time::Instant::now();
            while !cx.is_cancelled() && started.elapsed() < Duration::from_secs(5) {
                std::thread::sleep(Duration::from_millis(5));
            }
            rill_core::Invoked::Ready(Value::Void)
        }));

        let future = runtime.submit_with_deadline(op, vec![], Duration::from_millis(50));
        match future.wait_timeout(Duration::from_secs(2)) {
            Some(Settled::Failed(e)) => assert_eq!(e.kind, ErrorKind::Timeout),
            other => panic!("expected timeout, got {other:?}"),
        }
        runtime.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_shutdown_stops_everything() {
        let runtime = Runtime::with_defaults();
        let op: Arc<dyn Operation> = Arc::new(FnOperation::ready("noop", |_| Value::Void));
        let _handle: RepeatHandle =
            runtime
                .scheduler()
                .schedule_repeating(Arc::clone(&op), vec![], Duration::from_millis(10));
        runtime.shutdown(Duration::from_millis(200));

        let after = runtime.submit(op, vec![]);
        assert_eq!(after.state(), rill_core::FutureState::Cancelled);
    }
}
