//! Chained variable environments
//!
//! A `Scope` is a cheaply cloneable handle over one environment node: its
//! own guarded bindings, an ordered listener registry, and a non-owning
//! reference to its parent. Name resolution walks innermost to outermost,
//! first match wins. A parent keeps its children alive (and `destroy` tears
//! the subtree down), while children hold only weak parent references - the
//! tree has no cycles.
//!
//! ## Write path
//!
//! `set` resolves the owning scope, then under that scope's write
//! serialization: checks reentrancy, the read-only flag, and the guard
//! chain; swaps the stored value; and dispatches a [`Signal`] synchronously
//! to the key's listeners in registration order. A rejection at any step
//! leaves the binding untouched. Writes to the same key are serialized;
//! nothing is promised across keys or scopes.
//!
//! Reentrancy - a listener calling `set` on the key it is being notified
//! for - is detected through a thread-local dispatch stack and rejected
//! before it can cycle.

use crate::listener::{ListenerFn, ListenerHandle, ListenerRegistry};
use crate::signal::Signal;
use crate::variable::Variable;
use chrono::Utc;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use rill_core::{
    AccessKind, ConstraintViolation, ErrorValue, Fault, GuardCandidate, GuardChain, Value,
    VarFlags, VarKey,
};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// Unique identity of a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(Uuid);

impl ScopeId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID (test fixtures)
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a `set` or `declare` did not change anything
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SetError {
    /// No enclosing binding for the key
    #[error("unbound variable {0}")]
    Unbound(VarKey),

    /// The guard chain rejected the candidate
    #[error(transparent)]
    Violation(#[from] ConstraintViolation),

    /// The binding was declared read-only
    #[error("variable {0} is read-only")]
    ReadOnly(VarKey),

    /// The key is already bound in the target scope
    #[error("variable {0} is already declared in this scope")]
    AlreadyDeclared(VarKey),

    /// A listener re-entered `set` on the key it is being notified for
    #[error("reentrant set on {0} from its own listener")]
    Reentrant(VarKey),

    /// The scope was destroyed
    #[error("scope has been destroyed")]
    Destroyed,

    /// The key names a mount that is not present
    #[error("no module mounted as {0}")]
    UnknownModule(String),
}

impl SetError {
    /// The fatal signal behind this error, when the failure is an internal
    /// invariant breach rather than caller data
    pub fn as_fault(&self) -> Option<Fault> {
        match self {
            SetError::Reentrant(key) => Some(Fault::ListenerReentrancy {
                key: key.to_string(),
            }),
            SetError::Destroyed => Some(Fault::ScopeDestroyed),
            _ => None,
        }
    }
}

/// Scope-level error handler: return a substitute value to swallow the
/// error, or None to keep walking the chain
pub type ErrorHandlerFn = dyn Fn(&ErrorValue) -> Option<Value> + Send + Sync;

struct ScopeInner {
    id: ScopeId,
    name: String,
    root: bool,
    parent: Weak<ScopeInner>,
    bindings: RwLock<FxHashMap<VarKey, Variable>>,
    /// Serializes guard-check-then-write-then-notify per scope. Reentrant so
    /// a listener may write *other* keys of the same scope from its callback.
    write_serial: ReentrantMutex<()>,
    listeners: Arc<ListenerRegistry>,
    children: Mutex<Vec<Scope>>,
    mounts: RwLock<FxHashMap<String, Scope>>,
    error_handlers: Mutex<Vec<Arc<ErrorHandlerFn>>>,
    destroyed: AtomicBool,
}

thread_local! {
    /// Keys currently under notification on this thread, innermost last
    static DISPATCH_STACK: RefCell<Vec<(ScopeId, VarKey)>> = const { RefCell::new(Vec::new()) };
}

/// Pops the dispatch stack even when a listener panics
struct DispatchGuard;

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCH_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Handle to one environment node in the scope chain
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// New root scope
    pub fn root(name: impl Into<String>) -> Self {
        Self::with_parent(name, Weak::new(), true)
    }

    fn with_parent(name: impl Into<String>, parent: Weak<ScopeInner>, root: bool) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: ScopeId::new(),
                name: name.into(),
                root,
                parent,
                bindings: RwLock::new(FxHashMap::default()),
                write_serial: ReentrantMutex::new(()),
                listeners: Arc::new(ListenerRegistry::new()),
                children: Mutex::new(Vec::new()),
                mounts: RwLock::new(FxHashMap::default()),
                error_handlers: Mutex::new(Vec::new()),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    /// Create a child scope; the child is kept alive by this scope until
    /// destroyed
    pub fn push_child(&self, name: impl Into<String>) -> Scope {
        let child = Self::with_parent(name, Arc::downgrade(&self.inner), false);
        self.inner.children.lock().push(child.clone());
        child
    }

    /// This scope's identity
    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    /// The name given at construction
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The parent scope, if this is not a root
    pub fn parent(&self) -> Option<Scope> {
        self.inner.parent.upgrade().map(|inner| Scope { inner })
    }

    /// True for a scope created without a parent
    pub fn is_root(&self) -> bool {
        self.inner.root
    }

    /// True once `destroy` has run
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// True if `other` is this scope or one of its ancestors
    pub fn has_ancestor(&self, other: &Scope) -> bool {
        let mut current = Some(self.inner.clone());
        while let Some(scope) = current {
            if scope.id == other.inner.id {
                return true;
            }
            current = scope.parent.upgrade();
        }
        false
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve `key` walking innermost to outermost; first match wins.
    /// Ancestors' private bindings are invisible and fall through.
    pub fn lookup(&self, key: &VarKey) -> Option<Value> {
        if let Some(qualifier) = &key.qualifier {
            let mount = self.mounted(qualifier)?;
            return mount.lookup(&VarKey::new(key.name.clone()));
        }
        let mut current = Some(self.inner.clone());
        let mut depth = 0usize;
        while let Some(scope) = current {
            {
                let bindings = scope.bindings.read();
                if let Some(var) = bindings.get(key) {
                    if depth == 0 || !var.flags().private {
                        return Some(var.value().clone());
                    }
                }
            }
            current = Self::parent_of(&scope);
            depth += 1;
        }
        None
    }

    /// Resolve `key` and run its guard chain as a read
    pub fn read_guarded(&self, key: &VarKey) -> Result<Option<Value>, ConstraintViolation> {
        let owner = match self.scope_for_key(key) {
            Some(owner) => owner,
            None => return Ok(None),
        };
        let bindings = owner.inner.bindings.read();
        match bindings.get(key) {
            Some(var) => {
                var.check_read(key)?;
                Ok(Some(var.value().clone()))
            }
            None => Ok(None),
        }
    }

    /// True when `key` resolves anywhere in the chain
    pub fn has(&self, key: &VarKey) -> bool {
        self.lookup(key).is_some()
    }

    /// The scope owning the nearest visible binding for `key`
    pub fn scope_for_key(&self, key: &VarKey) -> Option<Scope> {
        if let Some(qualifier) = &key.qualifier {
            let mount = self.mounted(qualifier)?;
            return mount.scope_for_key(&VarKey::new(key.name.clone()));
        }
        let mut current = Some(self.inner.clone());
        let mut depth = 0usize;
        while let Some(scope) = current {
            {
                let bindings = scope.bindings.read();
                if let Some(var) = bindings.get(key) {
                    if depth == 0 || !var.flags().private {
                        return Some(Scope { inner: scope.clone() });
                    }
                }
            }
            current = Self::parent_of(&scope);
            depth += 1;
        }
        None
    }

    fn parent_of(scope: &Arc<ScopeInner>) -> Option<Arc<ScopeInner>> {
        match scope.parent.upgrade() {
            Some(parent) => Some(parent),
            None => {
                // a non-root scope outliving its parent is an invariant breach
                if !scope.root && !scope.destroyed.load(Ordering::Acquire) {
                    error!(scope = %scope.id, fault = %Fault::ParentGone, "scope chain broken");
                }
                None
            }
        }
    }

    // =========================================================================
    // Declaration and writes
    // =========================================================================

    /// Create a binding in *this* scope
    ///
    /// The guard chain runs against the initial value with declare access;
    /// a rejection leaves the scope without the binding. Successful
    /// declaration dispatches a declare signal.
    pub fn declare(
        &self,
        key: impl Into<VarKey>,
        value: Value,
        guards: GuardChain,
        flags: VarFlags,
    ) -> Result<(), SetError> {
        let key: VarKey = key.into();
        if let Some(qualifier) = key.qualifier.clone() {
            let mount = self
                .mounted(&qualifier)
                .ok_or(SetError::UnknownModule(qualifier))?;
            return mount.declare(VarKey::new(key.name), value, guards, flags);
        }
        if self.is_destroyed() {
            return Err(SetError::Destroyed);
        }
        let _serial = self.inner.write_serial.lock();
        if self.inner.bindings.read().contains_key(&key) {
            return Err(SetError::AlreadyDeclared(key));
        }
        guards.check(&GuardCandidate {
            key: &key,
            value: &value,
            access: AccessKind::Declare,
            prior: None,
        })?;
        self.inner
            .bindings
            .write()
            .insert(key.clone(), Variable::new(value.clone(), guards, flags));
        self.dispatch(Signal {
            scope: self.inner.id,
            key,
            access: AccessKind::Declare,
            old: None,
            new: value,
            version: 1,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Write the nearest enclosing binding for `key`
    ///
    /// Returns the stored value on success. Fails with `Unbound` when no
    /// binding exists anywhere in the chain; use
    /// [`set_or_declare`](Self::set_or_declare) for implicit declaration.
    pub fn set(&self, key: impl Into<VarKey>, value: Value) -> Result<Value, SetError> {
        let key: VarKey = key.into();
        if self.is_destroyed() {
            return Err(SetError::Destroyed);
        }
        if let Some(qualifier) = key.qualifier.clone() {
            let mount = self
                .mounted(&qualifier)
                .ok_or(SetError::UnknownModule(qualifier))?;
            return mount.set(VarKey::new(key.name), value);
        }
        match self.scope_for_key(&key) {
            Some(owner) => owner.set_local(key, value),
            None => Err(SetError::Unbound(key)),
        }
    }

    /// Like [`set`](Self::set), but an unbound key is implicitly declared in
    /// this scope with an empty guard chain
    pub fn set_or_declare(&self, key: impl Into<VarKey>, value: Value) -> Result<Value, SetError> {
        let key: VarKey = key.into();
        if self.is_destroyed() {
            return Err(SetError::Destroyed);
        }
        match self.scope_for_key(&key) {
            Some(owner) => owner.set_local(key, value),
            None => {
                self.declare(
                    key,
                    value.clone(),
                    GuardChain::empty(),
                    VarFlags::default().implicit_declare(),
                )?;
                Ok(value)
            }
        }
    }

    fn set_local(&self, key: VarKey, value: Value) -> Result<Value, SetError> {
        if self.is_destroyed() {
            return Err(SetError::Destroyed);
        }
        let _serial = self.inner.write_serial.lock();

        let reentrant = DISPATCH_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .any(|(scope, k)| *scope == self.inner.id && *k == key)
        });
        if reentrant {
            let fault = Fault::ListenerReentrancy {
                key: key.to_string(),
            };
            error!(scope = %self.inner.id, %fault, "rejected reentrant write");
            return Err(SetError::Reentrant(key));
        }

        // check phase: read-only flag and guard chain, binding untouched
        {
            let bindings = self.inner.bindings.read();
            let var = bindings
                .get(&key)
                .ok_or_else(|| SetError::Unbound(key.clone()))?;
            if var.flags().read_only {
                return Err(SetError::ReadOnly(key));
            }
            var.check_write(&key, &value)?;
        }

        // accepted: swap atomically with respect to other writers
        let (old, version) = {
            let mut bindings = self.inner.bindings.write();
            let var = bindings
                .get_mut(&key)
                .ok_or_else(|| SetError::Unbound(key.clone()))?;
            let old = var.store(value.clone());
            (old, var.version())
        };

        self.dispatch(Signal {
            scope: self.inner.id,
            key,
            access: AccessKind::Write,
            old: Some(old),
            new: value.clone(),
            version,
            at: Utc::now(),
        });
        Ok(value)
    }

    fn dispatch(&self, signal: Signal) {
        DISPATCH_STACK.with(|stack| {
            stack
                .borrow_mut()
                .push((signal.scope, signal.key.clone()));
        });
        let _guard = DispatchGuard;
        self.inner.listeners.notify(&signal);
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Listen for changes of `key`
    ///
    /// Registers on the scope owning the nearest visible binding (so a
    /// listener placed through a child observes the binding that `set`
    /// through that child would write), falling back to this scope for keys
    /// that are not bound yet.
    pub fn add_listener(
        &self,
        key: impl Into<VarKey>,
        listener: impl Fn(&Signal) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let key: VarKey = key.into();
        let owner = self.scope_for_key(&key).unwrap_or_else(|| self.clone());
        let callback: Arc<ListenerFn> = Arc::new(listener);
        let id = owner.inner.listeners.register(key.clone(), callback);
        ListenerHandle::new(&owner.inner.listeners, key, id)
    }

    /// Remove a registration made through [`add_listener`](Self::add_listener)
    pub fn remove_listener(&self, handle: ListenerHandle) -> bool {
        handle.dispose()
    }

    /// Re-dispatch the current value of `key` to its listeners
    pub fn notify(&self, key: &VarKey) -> Result<Value, SetError> {
        let owner = self
            .scope_for_key(key)
            .ok_or_else(|| SetError::Unbound(key.clone()))?;
        if owner.is_destroyed() {
            return Err(SetError::Destroyed);
        }
        let _serial = owner.inner.write_serial.lock();
        let (value, version) = {
            let bindings = owner.inner.bindings.read();
            let var = bindings
                .get(key)
                .ok_or_else(|| SetError::Unbound(key.clone()))?;
            (var.value().clone(), var.version())
        };
        owner.dispatch(Signal {
            scope: owner.inner.id,
            key: key.clone(),
            access: AccessKind::Read,
            old: Some(value.clone()),
            new: value.clone(),
            version,
            at: Utc::now(),
        });
        Ok(value)
    }

    /// Listeners currently registered for `key` on this scope
    pub fn listener_count(&self, key: &VarKey) -> usize {
        self.inner.listeners.count(key)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Snapshot of this scope's own bindings
    pub fn variables(&self) -> Vec<(VarKey, Value)> {
        self.inner
            .bindings
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.value().clone()))
            .collect()
    }

    /// Version of the binding for `key` in this scope, if present
    pub fn version_of(&self, key: &VarKey) -> Option<u64> {
        self.inner.bindings.read().get(key).map(|v| v.version())
    }

    /// Flags of the nearest visible binding for `key`
    pub fn flags_of(&self, key: &VarKey) -> Option<VarFlags> {
        let owner = self.scope_for_key(key)?;
        let bindings = owner.inner.bindings.read();
        bindings.get(key).map(|v| v.flags())
    }

    /// Positional parameter values declared in this scope, slot order
    pub fn parameters_in_order(&self) -> Vec<Value> {
        let bindings = self.inner.bindings.read();
        let mut params: Vec<(usize, Value)> = bindings
            .iter()
            .filter(|(_, var)| var.flags().parameter)
            .filter_map(|(key, var)| {
                key.positional_index().map(|i| (i, var.value().clone()))
            })
            .collect();
        params.sort_by_key(|(i, _)| *i);
        params.into_iter().map(|(_, v)| v).collect()
    }

    /// Deep copy of this scope's bindings into a fresh sibling scope
    ///
    /// Volatile bindings and listener registrations are not copied.
    pub fn copy(&self) -> Scope {
        let copied = Self::with_parent(
            self.inner.name.clone(),
            self.inner.parent.clone(),
            self.inner.root,
        );
        {
            let source = self.inner.bindings.read();
            let mut target = copied.inner.bindings.write();
            for (key, var) in source.iter() {
                if !var.flags().volatile {
                    target.insert(key.clone(), var.clone());
                }
            }
        }
        if let Some(parent) = self.parent() {
            parent.inner.children.lock().push(copied.clone());
        }
        copied
    }

    // =========================================================================
    // Mounting and teardown
    // =========================================================================

    /// Mount a resolved module scope under `name`
    ///
    /// Qualified keys (`name::var`) resolve through the mount. The mounted
    /// scope is opaque: its internals stay whatever the resolver built.
    pub fn mount(&self, name: impl Into<String>, module: Scope) {
        self.inner.mounts.write().insert(name.into(), module);
    }

    /// The module mounted under `name`, here or in an ancestor
    pub fn mounted(&self, name: &str) -> Option<Scope> {
        let mut current = Some(self.inner.clone());
        while let Some(scope) = current {
            if let Some(module) = scope.mounts.read().get(name) {
                return Some(module.clone());
            }
            current = Self::parent_of(&scope);
        }
        None
    }

    /// Register an error handler consulted by [`handle_error`](Self::handle_error)
    pub fn on_error(&self, handler: impl Fn(&ErrorValue) -> Option<Value> + Send + Sync + 'static) {
        self.inner.error_handlers.lock().push(Arc::new(handler));
    }

    /// Offer an error to this scope's handlers, then to each ancestor's
    ///
    /// The first handler returning a substitute value wins; with no taker
    /// the error comes back as an error value.
    pub fn handle_error(&self, error: ErrorValue) -> Value {
        let mut current = Some(self.inner.clone());
        while let Some(scope) = current {
            let handlers: Vec<Arc<ErrorHandlerFn>> = scope.error_handlers.lock().clone();
            for handler in handlers {
                if let Some(substitute) = handler(&error) {
                    return substitute;
                }
            }
            current = Self::parent_of(&scope);
        }
        Value::from_error(error)
    }

    /// Remove all bindings, listeners, mounts, and error handlers
    pub fn clear(&self) {
        let _serial = self.inner.write_serial.lock();
        self.inner.bindings.write().clear();
        self.inner.listeners.clear();
        self.inner.mounts.write().clear();
        self.inner.error_handlers.lock().clear();
    }

    /// Tear down this scope and its subtree
    ///
    /// Children are destroyed first; the parent is never touched beyond
    /// dropping its reference to this scope.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let children: Vec<Scope> = self.inner.children.lock().drain(..).collect();
        for child in children {
            child.destroy();
        }
        self.clear();
        if let Some(parent) = self.parent() {
            parent
                .inner
                .children
                .lock()
                .retain(|c| c.id() != self.id());
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id.to_string())
            .field("name", &self.inner.name)
            .field("bindings", &self.inner.bindings.read().len())
            .field("root", &self.is_root())
            .finish()
    }
}
