//! The operation contract
//!
//! An [`Operation`] is a pure description of a computation over values:
//! stateless, re-invocable, and safe to invoke concurrently from multiple
//! execution contexts. Any environment an operation needs (a scope, a
//! resource handle) is captured at construction by whoever built the graph;
//! the invocation context carries only the execution-control surface.

use crate::cancel::CancelToken;
use crate::future::FutureValue;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Result of invoking an operation
#[derive(Debug)]
pub enum Invoked {
    /// The value is available now (it may itself be an error value)
    Ready(Value),
    /// The value arrives through a future the caller must chain on
    Deferred(FutureValue),
}

impl Invoked {
    /// The immediate value, if any
    pub fn ready(self) -> Option<Value> {
        match self {
            Invoked::Ready(v) => Some(v),
            Invoked::Deferred(_) => None,
        }
    }
}

impl From<Value> for Invoked {
    fn from(v: Value) -> Self {
        Invoked::Ready(v)
    }
}

impl From<FutureValue> for Invoked {
    fn from(f: FutureValue) -> Self {
        Invoked::Deferred(f)
    }
}

/// Execution-control surface handed to every invocation
///
/// `tick` is 0 for one-shot execution and the iteration index for repeating
/// schedules.
#[derive(Debug, Clone)]
pub struct OpContext {
    /// Cooperative cancellation token the operation should poll
    pub token: CancelToken,
    /// Iteration index under a repeating schedule
    pub tick: u64,
}

impl OpContext {
    /// Context observing `token`, tick 0
    pub fn new(token: CancelToken) -> Self {
        Self { token, tick: 0 }
    }

    /// Same token, given tick
    pub fn with_tick(token: CancelToken, tick: u64) -> Self {
        Self { token, tick }
    }

    /// Detached context for direct invocation outside the engine
    pub fn detached() -> Self {
        Self::new(CancelToken::new())
    }

    /// Shorthand for polling the token
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A unit of computation over values
///
/// Implementations must not keep hidden shared mutable state: everything an
/// invocation touches is either an input, the context, or state the
/// construction site explicitly shared.
pub trait Operation: Send + Sync {
    /// Name used in diagnostics and worker logs
    fn name(&self) -> &str;

    /// Perform the computation
    fn invoke(&self, inputs: &[Value], cx: &OpContext) -> Invoked;
}

impl fmt::Debug for dyn Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<operation {}>", self.name())
    }
}

impl<T: Operation + ?Sized> Operation for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn invoke(&self, inputs: &[Value], cx: &OpContext) -> Invoked {
        (**self).invoke(inputs, cx)
    }
}

/// Closure adapter implementing [`Operation`]
pub struct FnOperation<F> {
    name: String,
    f: F,
}

impl<F> FnOperation<F>
where
    F: Fn(&[Value], &OpContext) -> Invoked + Send + Sync,
{
    /// Wrap a full closure taking inputs and context
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl FnOperation<Box<dyn Fn(&[Value], &OpContext) -> Invoked + Send + Sync>> {
    /// Wrap a plain value function that ignores the context
    pub fn ready(
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            f: Box::new(move |inputs, _cx| Invoked::Ready(f(inputs))),
        }
    }
}

impl<F> Operation for FnOperation<F>
where
    F: Fn(&[Value], &OpContext) -> Invoked + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, inputs: &[Value], cx: &OpContext) -> Invoked {
        (self.f)(inputs, cx)
    }
}
