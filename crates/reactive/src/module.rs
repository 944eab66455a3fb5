//! Module resolution seam
//!
//! The core never resolves module paths itself: a [`ModuleResolver`]
//! collaborator turns a path into a ready scope, and the result is mounted
//! as an opaque child consulted by qualified lookups. [`StaticResolver`] is
//! the in-tree implementation used by hosts that preload their modules.

use crate::scope::Scope;
use parking_lot::RwLock;
use rill_core::{ErrorKind, ErrorValue};
use rustc_hash::FxHashMap;

/// Supplies named scopes on demand
pub trait ModuleResolver: Send + Sync {
    /// Resolve `path` into a module scope
    fn resolve(&self, path: &str) -> Result<Scope, ErrorValue>;
}

/// Resolver over a fixed, preregistered module set
#[derive(Default)]
pub struct StaticResolver {
    modules: RwLock<FxHashMap<String, Scope>>,
}

impl StaticResolver {
    /// Empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module under `path`
    pub fn register(&self, path: impl Into<String>, module: Scope) {
        self.modules.write().insert(path.into(), module);
    }
}

impl ModuleResolver for StaticResolver {
    fn resolve(&self, path: &str) -> Result<Scope, ErrorValue> {
        self.modules.read().get(path).cloned().ok_or_else(|| {
            ErrorValue::new(ErrorKind::Resource, format!("unknown module: {path:?}"))
        })
    }
}

/// Resolve `path` through `resolver` and mount the result on `scope` as
/// `name`
pub fn mount_module(
    scope: &Scope,
    resolver: &dyn ModuleResolver,
    name: &str,
    path: &str,
) -> Result<(), ErrorValue> {
    let module = resolver.resolve(path)?;
    scope.mount(name, module);
    Ok(())
}
