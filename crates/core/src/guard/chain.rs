//! Ordered guard composition
//!
//! A chain is an immutable ordered list of guards built once and shared
//! read-only across every access to a variable. Evaluation short-circuits on
//! the first rejection and returns that guard's violation; earlier guards
//! take precedence by construction.

use super::{ConstraintViolation, Guard, GuardCandidate, GuardVerdict};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

type Guards = SmallVec<[Arc<dyn Guard>; 4]>;

/// Immutable, cheaply cloneable ordered composition of guards
#[derive(Clone, Default)]
pub struct GuardChain {
    guards: Arc<Guards>,
}

impl GuardChain {
    /// Chain that accepts everything
    pub fn empty() -> Self {
        Self::default()
    }

    /// Start building a chain
    pub fn builder() -> GuardChainBuilder {
        GuardChainBuilder::default()
    }

    /// Single-guard chain
    pub fn of(guard: impl Guard + 'static) -> Self {
        Self::builder().push(guard).build()
    }

    /// Number of composed guards
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// True when no guards are composed
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Names of the composed guards, in evaluation order
    pub fn names(&self) -> Vec<&'static str> {
        self.guards.iter().map(|g| g.name()).collect()
    }

    /// Run the chain; the first rejection wins
    pub fn check(&self, candidate: &GuardCandidate<'_>) -> Result<(), ConstraintViolation> {
        for guard in self.guards.iter() {
            if let GuardVerdict::Reject { detail } = guard.evaluate(candidate) {
                return Err(ConstraintViolation {
                    guard: guard.name(),
                    key: candidate.key.clone(),
                    access: candidate.access.name(),
                    detail,
                    rejected: candidate.value.clone(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for GuardChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Builder yielding an immutable [`GuardChain`]
#[derive(Default)]
pub struct GuardChainBuilder {
    guards: Guards,
}

impl GuardChainBuilder {
    /// Append a guard; evaluation order is push order
    pub fn push(mut self, guard: impl Guard + 'static) -> Self {
        self.guards.push(Arc::new(guard));
        self
    }

    /// Append an already-shared guard
    pub fn push_shared(mut self, guard: Arc<dyn Guard>) -> Self {
        self.guards.push(guard);
        self
    }

    /// Finish the chain
    pub fn build(self) -> GuardChain {
        GuardChain {
            guards: Arc::new(self.guards),
        }
    }
}
