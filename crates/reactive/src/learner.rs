//! Count-based type prediction
//!
//! The type learner is an optional listener collaborator: it observes every
//! signal for the keys it is attached to and counts the tags that flow
//! through each binding. Predictions are indicative, not authoritative - the
//! core has no dependency on them.

use crate::listener::ListenerHandle;
use crate::scope::Scope;
use dashmap::DashMap;
use rill_core::{ValueKind, VarKey};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// What the learner currently believes about one key
#[derive(Debug, Clone, Default)]
pub struct TypePrediction {
    observations: u64,
    counts: FxHashMap<ValueKind, u64>,
}

impl TypePrediction {
    /// True when no evidence has been collected
    pub fn is_empty(&self) -> bool {
        self.observations == 0
    }

    /// Total number of observed writes
    pub fn observations(&self) -> u64 {
        self.observations
    }

    /// Estimated probability that the key holds `kind`
    ///
    /// Indicative only; probabilities across kinds sum to 1 but carry no
    /// confidence interval.
    pub fn probability(&self, kind: ValueKind) -> f64 {
        if self.observations == 0 {
            return 0.0;
        }
        *self.counts.get(&kind).unwrap_or(&0) as f64 / self.observations as f64
    }

    /// The most frequently observed tag
    pub fn probable_kind(&self) -> Option<ValueKind> {
        self.counts
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(kind, _)| *kind)
    }

    /// Every tag seen at least once
    pub fn kinds(&self) -> Vec<ValueKind> {
        self.counts.keys().copied().collect()
    }
}

/// Listener that learns the tag distribution of bindings
///
/// Clones share the evidence store, so the handle kept by the host and the
/// closures registered as listeners observe the same counts.
#[derive(Debug, Clone, Default)]
pub struct TypeLearner {
    counts: Arc<DashMap<VarKey, FxHashMap<ValueKind, u64>>>,
}

impl TypeLearner {
    /// Fresh learner with no evidence
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation (exposed so non-listener feeds can train too)
    pub fn observe(&self, key: &VarKey, kind: ValueKind) {
        *self
            .counts
            .entry(key.clone())
            .or_default()
            .entry(kind)
            .or_insert(0) += 1;
    }

    /// Attach to `key` on `scope` as an ordinary listener
    ///
    /// Volatile bindings are not learned from: their values change outside
    /// the signal path, so the evidence would be skewed.
    pub fn attach(&self, scope: &Scope, key: impl Into<VarKey>) -> ListenerHandle {
        let key: VarKey = key.into();
        let volatile = scope
            .flags_of(&key)
            .map(|flags| flags.volatile)
            .unwrap_or(false);
        let learner = self.clone();
        scope.add_listener(key, move |signal| {
            if !volatile {
                learner.observe(&signal.key, signal.new.kind());
            }
        })
    }

    /// The current prediction for `key`
    pub fn predict(&self, key: &VarKey) -> TypePrediction {
        match self.counts.get(key) {
            Some(counts) => TypePrediction {
                observations: counts.values().sum(),
                counts: counts.clone(),
            },
            None => TypePrediction::default(),
        }
    }
}
