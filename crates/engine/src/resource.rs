//! URI-addressed resource handlers
//!
//! External I/O goes through a pluggable factory registry: an operation asks
//! the [`ResourceResolver`] for the handler behind a URI's scheme and talks
//! to it through the uniform read/write/subscribe surface. The engine's
//! future and cancellation machinery wraps handler calls the same way it
//! wraps any other operation - nothing here is special-cased.
//!
//! `mem:` is the in-tree reference scheme: a process-local cell per path,
//! useful for tests and as the template for real transports.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rill_core::{ErrorKind, ErrorValue, Value, ValueUri};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked with each value written to a subscribed resource
pub type SubscriberFn = dyn Fn(&Value) + Send + Sync;

/// Token identifying one subscription on one handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Uniform surface over one addressed resource
pub trait ResourceHandler: std::fmt::Debug + Send + Sync {
    /// Current value of the resource
    fn read(&self) -> Result<Value, ErrorValue>;

    /// Write a value; returns the value now stored
    fn write(&self, value: Value) -> Result<Value, ErrorValue>;

    /// Observe every subsequent write
    fn subscribe(&self, subscriber: Arc<SubscriberFn>) -> SubscriptionId;

    /// Stop observing
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Opens handlers for one URI scheme
pub trait HandlerFactory: Send + Sync {
    /// Open (or reuse) the handler behind `uri`
    fn open(&self, uri: &ValueUri) -> Result<Arc<dyn ResourceHandler>, ErrorValue>;
}

/// Scheme → factory registry
#[derive(Default)]
pub struct ResourceResolver {
    factories: RwLock<FxHashMap<String, Arc<dyn HandlerFactory>>>,
}

impl ResourceResolver {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `mem:` scheme preinstalled
    pub fn with_memory() -> Self {
        let resolver = Self::new();
        resolver.register_scheme("mem", Arc::new(MemoryFactory::default()));
        resolver
    }

    /// Install a factory for `scheme`, replacing any previous one
    pub fn register_scheme(&self, scheme: impl Into<String>, factory: Arc<dyn HandlerFactory>) {
        self.factories.write().insert(scheme.into(), factory);
    }

    /// Resolve `uri` to its handler; unknown schemes are resource errors
    pub fn resolve(&self, uri: &ValueUri) -> Result<Arc<dyn ResourceHandler>, ErrorValue> {
        let factory = {
            let factories = self.factories.read();
            factories.get(&uri.scheme).cloned()
        };
        match factory {
            Some(factory) => factory.open(uri),
            None => Err(ErrorValue::new(
                ErrorKind::Resource,
                format!("no handler for scheme {:?}", uri.scheme),
            )),
        }
    }
}

// ============================================================================
// mem: reference implementation
// ============================================================================

/// Process-local cell behind one `mem:` path
pub struct MemoryHandler {
    value: Mutex<Value>,
    subscribers: Mutex<Vec<(u64, Arc<SubscriberFn>)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for MemoryHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHandler")
            .field("value", &*self.value.lock())
            .field("subscribers", &self.subscribers.lock().len())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}

impl MemoryHandler {
    fn new() -> Self {
        Self {
            value: Mutex::new(Value::Void),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl ResourceHandler for MemoryHandler {
    fn read(&self) -> Result<Value, ErrorValue> {
        Ok(self.value.lock().clone())
    }

    fn write(&self, value: Value) -> Result<Value, ErrorValue> {
        *self.value.lock() = value.clone();
        // notify outside the value lock, in subscription order
        let subscribers: Vec<Arc<SubscriberFn>> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, s)| Arc::clone(s))
            .collect();
        for subscriber in subscribers {
            subscriber(&value);
        }
        Ok(value)
    }

    fn subscribe(&self, subscriber: Arc<SubscriberFn>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push((id, subscriber));
        SubscriptionId(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().retain(|(sid, _)| *sid != id.0);
    }
}

/// Factory sharing one [`MemoryHandler`] per path
#[derive(Default)]
pub struct MemoryFactory {
    cells: DashMap<String, Arc<MemoryHandler>>,
}

impl HandlerFactory for MemoryFactory {
    fn open(&self, uri: &ValueUri) -> Result<Arc<dyn ResourceHandler>, ErrorValue> {
        let handler = self
            .cells
            .entry(uri.path.clone())
            .or_insert_with(|| Arc::new(MemoryHandler::new()))
            .clone();
        Ok(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_scheme_is_resource_error() {
        let resolver = ResourceResolver::new();
        let err = resolver
            .resolve(&ValueUri::new("gopher", "hole"))
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Resource);
        assert!(err.message.contains("gopher"));
    }

    #[test]
    fn test_memory_read_write() {
        let resolver = ResourceResolver::with_memory();
        let handler = resolver.resolve(&ValueUri::new("mem", "cell")).unwrap();

        assert_eq!(handler.read().unwrap(), Value::Void);
        handler.write(Value::Int(5)).unwrap();
        assert_eq!(handler.read().unwrap(), Value::Int(5));
    }

    #[test]
    fn test_same_path_shares_cell() {
        let resolver = ResourceResolver::with_memory();
        let a = resolver.resolve(&ValueUri::new("mem", "shared")).unwrap();
        let b = resolver.resolve(&ValueUri::new("mem", "shared")).unwrap();
        let c = resolver.resolve(&ValueUri::new("mem", "other")).unwrap();

        a.write(Value::text("seen")).unwrap();
        assert_eq!(b.read().unwrap(), Value::text("seen"));
        assert_eq!(c.read().unwrap(), Value::Void);
    }

    #[test]
    fn test_subscription_and_unsubscribe() {
        let handler = MemoryHandler::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let id = handler.subscribe(Arc::new(move |value: &Value| {
            s.lock().push(value.clone());
        }));

        handler.write(Value::Int(1)).unwrap();
        handler.write(Value::Int(2)).unwrap();
        handler.unsubscribe(id);
        handler.write(Value::Int(3)).unwrap();

        assert_eq!(*seen.lock(), vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_replacing_scheme_factory() {
        let resolver = ResourceResolver::with_memory();
        // a second registration for mem: replaces the first factory
        resolver.register_scheme("mem", Arc::new(MemoryFactory::default()));
        let handler = resolver.resolve(&ValueUri::new("mem", "fresh")).unwrap();
        assert_eq!(handler.read().unwrap(), Value::Void);
    }
}
