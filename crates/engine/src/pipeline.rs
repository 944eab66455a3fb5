//! Left-to-right operation composition
//!
//! A pipeline is itself an operation: stage N's output becomes stage N+1's
//! single input, and the pipeline's output is the final stage's output. An
//! error value short-circuits the remaining stages by default (the value
//! still *resolves* - errors are data), and a deferred stage suspends the
//! pipeline without occupying the calling worker: the remaining stages run
//! as a continuation on the settling thread.

use rill_core::{
    ErrorKind, FutureValue, Invoked, OpContext, Operation, Settled, Value,
};
use std::sync::Arc;

/// Ordered composition of operations
pub struct Pipeline {
    name: String,
    stages: Arc<Vec<Arc<dyn Operation>>>,
    short_circuit: bool,
}

impl Pipeline {
    /// Start an empty pipeline
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Arc::new(Vec::new()),
            short_circuit: true,
        }
    }

    /// Append a stage
    pub fn then(mut self, op: impl Operation + 'static) -> Self {
        Arc::make_mut(&mut self.stages).push(Arc::new(op));
        self
    }

    /// Append an already-shared stage
    pub fn then_shared(mut self, op: Arc<dyn Operation>) -> Self {
        Arc::make_mut(&mut self.stages).push(op);
        self
    }

    /// Let error values flow through the remaining stages instead of
    /// short-circuiting
    pub fn carry_errors(mut self) -> Self {
        self.short_circuit = false;
        self
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True when no stages were added
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Operation for Pipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, inputs: &[Value], cx: &OpContext) -> Invoked {
        let mut current: Vec<Value> = inputs.to_vec();
        for (index, stage) in self.stages.iter().enumerate() {
            if cx.is_cancelled() {
                return Invoked::Ready(Value::error(ErrorKind::Cancelled, "pipeline cancelled"));
            }
            match stage.invoke(&current, cx) {
                Invoked::Ready(value) => {
                    if self.short_circuit && value.is_error() {
                        return Invoked::Ready(value);
                    }
                    current = vec![value];
                }
                Invoked::Deferred(inner) => {
                    // suspend: chain the remaining stages onto the inner future
                    let outer = FutureValue::with_token(cx.token.clone());
                    chain_remaining(
                        inner,
                        Arc::clone(&self.stages),
                        index + 1,
                        cx.clone(),
                        outer.clone(),
                        self.short_circuit,
                    );
                    return Invoked::Deferred(outer);
                }
            }
        }
        Invoked::Ready(current.into_iter().next().unwrap_or(Value::Void))
    }
}

/// Resume the pipeline at `next` once `inner` settles
fn chain_remaining(
    inner: FutureValue,
    stages: Arc<Vec<Arc<dyn Operation>>>,
    next: usize,
    cx: OpContext,
    outer: FutureValue,
    short_circuit: bool,
) {
    inner.on_settled(move |settled: &Settled| match settled {
        Settled::Resolved(value) => {
            run_from(stages, next, value.clone(), cx, outer, short_circuit);
        }
        Settled::Failed(error) => {
            let _ = outer.fail(error.clone());
        }
        Settled::Cancelled => {
            let _ = outer.cancel();
        }
    });
}

fn run_from(
    stages: Arc<Vec<Arc<dyn Operation>>>,
    mut index: usize,
    mut current: Value,
    cx: OpContext,
    outer: FutureValue,
    short_circuit: bool,
) {
    while index < stages.len() {
        if cx.is_cancelled() {
            let _ = outer.cancel();
            return;
        }
        if short_circuit && current.is_error() {
            let _ = outer.resolve(current);
            return;
        }
        let stage = Arc::clone(&stages[index]);
        match stage.invoke(&[current], &cx) {
            Invoked::Ready(value) => {
                current = value;
                index += 1;
            }
            Invoked::Deferred(inner) => {
                chain_remaining(inner, stages, index + 1, cx, outer, short_circuit);
                return;
            }
        }
    }
    let _ = outer.resolve(current);
}
