//! Per-key listener registry
//!
//! Listeners are held in an explicit registry keyed by variable, not as
//! back-references from variables to observers - registration hands out a
//! disposable [`ListenerHandle`] holding only a non-owning pointer, so
//! listener lifetime never couples to scope lifetime and no reference cycles
//! can form.

use crate::signal::Signal;
use dashmap::DashMap;
use rill_core::VarKey;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Callback invoked with each signal for a key
pub type ListenerFn = dyn Fn(&Signal) + Send + Sync;

struct ListenerEntry {
    id: u64,
    callback: Arc<ListenerFn>,
}

/// Ordered listener registrations, keyed by variable
///
/// Registration order is dispatch order. The registry is shared between the
/// owning scope and the handles it issued.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: DashMap<VarKey, Vec<ListenerEntry>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    /// Fresh, empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `key`; returns the registration id
    pub fn register(&self, key: VarKey, callback: Arc<ListenerFn>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .entry(key)
            .or_default()
            .push(ListenerEntry { id, callback });
        id
    }

    /// Remove a registration; true if it was present
    pub fn remove(&self, key: &VarKey, id: u64) -> bool {
        match self.entries.get_mut(key) {
            Some(mut listeners) => {
                let before = listeners.len();
                listeners.retain(|entry| entry.id != id);
                listeners.len() != before
            }
            None => false,
        }
    }

    /// Dispatch a signal to every listener of its key, in registration order
    ///
    /// Callbacks run outside the registry's internal locks, so a listener may
    /// register or dispose other listeners without deadlocking.
    pub fn notify(&self, signal: &Signal) {
        let callbacks: Vec<Arc<ListenerFn>> = match self.entries.get(&signal.key) {
            Some(listeners) => listeners.iter().map(|e| Arc::clone(&e.callback)).collect(),
            None => return,
        };
        for callback in callbacks {
            callback(signal);
        }
    }

    /// Number of listeners registered for `key`
    pub fn count(&self, key: &VarKey) -> usize {
        self.entries.get(key).map(|l| l.len()).unwrap_or(0)
    }

    /// Drop every registration
    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// Disposable registration token
///
/// Holds a non-owning reference to the registry; disposing after the scope
/// is gone is a quiet no-op. Dropping the handle without calling
/// [`dispose`](Self::dispose) leaves the listener registered - unregistration
/// is always explicit.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    registry: Weak<ListenerRegistry>,
    key: VarKey,
    id: u64,
}

impl ListenerHandle {
    pub(crate) fn new(registry: &Arc<ListenerRegistry>, key: VarKey, id: u64) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            key,
            id,
        }
    }

    /// Key this handle listens on
    pub fn key(&self) -> &VarKey {
        &self.key
    }

    /// Remove the registration; true if it was still present
    pub fn dispose(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(&self.key, self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("keys", &self.entries.len())
            .finish()
    }
}
