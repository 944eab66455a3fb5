//! Single-assignment future values
//!
//! A `FutureValue` is the placeholder half of the execution contract: a
//! result slot that transitions `Pending -> Resolved | Failed | Cancelled`
//! exactly once. Continuations registered before settlement run in
//! registration order on the settling thread; continuations registered after
//! settlement run immediately on the registering thread.
//!
//! Settlement is the only locked transition. Waiting is provided for test
//! harnesses and host programs; the engine itself never blocks a worker on
//! another future's settlement.

use crate::cancel::CancelToken;
use crate::error::{ErrorKind, ErrorValue};
use crate::value::Value;
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Terminal state of a settled future
#[derive(Debug, Clone, PartialEq)]
pub enum Settled {
    /// The computation produced a value (which may itself be an error value)
    Resolved(Value),
    /// The computation failed outside the data channel
    Failed(ErrorValue),
    /// The computation was cancelled before producing a result
    Cancelled,
}

impl Settled {
    /// The resolved value, if this settlement is `Resolved`
    pub fn value(&self) -> Option<&Value> {
        match self {
            Settled::Resolved(v) => Some(v),
            _ => None,
        }
    }

    /// Collapse the settlement into a value, mapping failure and
    /// cancellation onto error values
    pub fn into_value(self) -> Value {
        match self {
            Settled::Resolved(v) => v,
            Settled::Failed(e) => Value::from_error(e),
            Settled::Cancelled => {
                Value::from_error(ErrorValue::new(ErrorKind::Cancelled, "future cancelled"))
            }
        }
    }
}

/// Coarse state tag, without the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureState {
    /// Not yet settled
    Pending,
    /// Settled with a value
    Resolved,
    /// Settled with a failure
    Failed,
    /// Settled by cancellation
    Cancelled,
}

/// Result of a settlement attempt
///
/// Every transition is one-shot: the losing side of a settlement race gets
/// `AlreadySettled` and must not treat it as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// This call performed the transition
    Settled,
    /// The future was settled earlier; this call changed nothing
    AlreadySettled,
}

type Continuation = Box<dyn FnOnce(&Settled) + Send>;

enum Slot {
    Pending {
        continuations: SmallVec<[Continuation; 2]>,
    },
    Done(Settled),
}

struct FutureInner {
    slot: Mutex<Slot>,
    settled: Condvar,
    token: CancelToken,
}

/// Single-assignment placeholder for a not-yet-computed value
///
/// Clones share the slot; equality is identity.
#[derive(Clone)]
pub struct FutureValue {
    inner: Arc<FutureInner>,
}

impl FutureValue {
    /// New pending future with a fresh cancellation token
    pub fn new() -> Self {
        Self::with_token(CancelToken::new())
    }

    /// New pending future observing the given token
    pub fn with_token(token: CancelToken) -> Self {
        Self {
            inner: Arc::new(FutureInner {
                slot: Mutex::new(Slot::Pending {
                    continuations: SmallVec::new(),
                }),
                settled: Condvar::new(),
                token,
            }),
        }
    }

    /// Already-resolved future
    pub fn resolved(value: Value) -> Self {
        let future = Self::new();
        let _ = future.resolve(value);
        future
    }

    /// Already-cancelled future (used by the executor after shutdown)
    pub fn cancelled() -> Self {
        let future = Self::new();
        let _ = future.cancel();
        future
    }

    /// The cancellation token operations computing this future must poll
    pub fn token(&self) -> &CancelToken {
        &self.inner.token
    }

    /// Arm a deadline on the token
    ///
    /// Expiry makes the token read cancelled; the transition to
    /// `Failed(Timeout)` is performed by the scheduler watching the deadline.
    pub fn set_deadline(&self, timeout: Duration) {
        self.inner.token.set_deadline(timeout);
    }

    /// Settle with a value. One-shot.
    pub fn resolve(&self, value: Value) -> SettleOutcome {
        self.settle(Settled::Resolved(value))
    }

    /// Settle with a failure. One-shot.
    pub fn fail(&self, error: ErrorValue) -> SettleOutcome {
        self.settle(Settled::Failed(error))
    }

    /// Settle by cancellation and trip the token. One-shot.
    pub fn cancel(&self) -> SettleOutcome {
        let outcome = self.settle(Settled::Cancelled);
        if outcome == SettleOutcome::Settled {
            self.inner.token.cancel();
        }
        outcome
    }

    /// Perform a settlement transition
    ///
    /// Continuations drain exactly once, in registration order, on the
    /// calling thread, outside the slot lock.
    pub fn settle(&self, settled: Settled) -> SettleOutcome {
        let continuations = {
            let mut slot = self.inner.slot.lock();
            match &mut *slot {
                Slot::Pending { continuations } => {
                    let drained = std::mem::take(continuations);
                    *slot = Slot::Done(settled.clone());
                    self.inner.settled.notify_all();
                    drained
                }
                Slot::Done(_) => return SettleOutcome::AlreadySettled,
            }
        };
        for continuation in continuations {
            continuation(&settled);
        }
        SettleOutcome::Settled
    }

    /// Register a continuation to run exactly once on settlement
    ///
    /// Runs immediately when the future is already settled.
    pub fn on_settled(&self, f: impl FnOnce(&Settled) + Send + 'static) {
        let run_now = {
            let mut slot = self.inner.slot.lock();
            match &mut *slot {
                Slot::Pending { continuations } => {
                    continuations.push(Box::new(f));
                    None
                }
                Slot::Done(settled) => Some((f, settled.clone())),
            }
        };
        if let Some((f, settled)) = run_now {
            f(&settled);
        }
    }

    /// Non-blocking settlement check
    pub fn poll(&self) -> Option<Settled> {
        match &*self.inner.slot.lock() {
            Slot::Pending { .. } => None,
            Slot::Done(settled) => Some(settled.clone()),
        }
    }

    /// Coarse state tag
    pub fn state(&self) -> FutureState {
        match &*self.inner.slot.lock() {
            Slot::Pending { .. } => FutureState::Pending,
            Slot::Done(Settled::Resolved(_)) => FutureState::Resolved,
            Slot::Done(Settled::Failed(_)) => FutureState::Failed,
            Slot::Done(Settled::Cancelled) => FutureState::Cancelled,
        }
    }

    /// True once the future has left `Pending`
    pub fn is_settled(&self) -> bool {
        self.poll().is_some()
    }

    /// Block until settlement. Test-harness and host-program surface only.
    pub fn wait(&self) -> Settled {
        let mut slot = self.inner.slot.lock();
        loop {
            if let Slot::Done(settled) = &*slot {
                return settled.clone();
            }
            self.inner.settled.wait(&mut slot);
        }
    }

    /// Block until settlement or timeout; None on timeout
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Settled> {
        let deadline = std::time::Instant::now() + timeout;
        let mut slot = self.inner.slot.lock();
        loop {
            if let Slot::Done(settled) = &*slot {
                return Some(settled.clone());
            }
            if self.inner.settled.wait_until(&mut slot, deadline).timed_out() {
                return match &*slot {
                    Slot::Done(settled) => Some(settled.clone()),
                    Slot::Pending { .. } => None,
                };
            }
        }
    }
}

impl Default for FutureValue {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for FutureValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for FutureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state() {
            FutureState::Pending => write!(f, "<future pending>"),
            FutureState::Resolved => write!(f, "<future resolved>"),
            FutureState::Failed => write!(f, "<future failed>"),
            FutureState::Cancelled => write!(f, "<future cancelled>"),
        }
    }
}
