//! Variable identities and binding flags
//!
//! - `VarKey`: name plus optional scope qualifier, the identity every
//!   binding, guard candidate, and change signal is keyed by
//! - `VarFlags`: per-binding behavior switches checked on declare/set

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a variable binding
///
/// A key is a plain name (`count`), a qualified name (`math::pi`, used for
/// bindings inside a mounted module scope), or a positional parameter slot
/// (`1`, `2`, ...) as used by parameterized blocks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarKey {
    /// Qualifier naming a mounted module scope, if any
    pub qualifier: Option<String>,
    /// Unqualified variable name
    pub name: String,
}

impl VarKey {
    /// Key for a plain name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            qualifier: None,
            name: name.into(),
        }
    }

    /// Key qualified by a mounted module name
    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }

    /// Key for positional parameter slot `n` (1-based)
    pub fn positional(n: usize) -> Self {
        Self {
            qualifier: None,
            name: n.to_string(),
        }
    }

    /// Parse `module::name` into a qualified key, anything else into a plain one
    pub fn parse(rendered: &str) -> Self {
        match rendered.split_once("::") {
            Some((qualifier, name)) if !qualifier.is_empty() => Self::qualified(qualifier, name),
            _ => Self::new(rendered),
        }
    }

    /// Positional slot index if this key is a parameter slot
    pub fn positional_index(&self) -> Option<usize> {
        if self.qualifier.is_some() {
            return None;
        }
        self.name.parse::<usize>().ok().filter(|n| *n > 0)
    }

    /// True if the key carries a module qualifier
    pub fn is_qualified(&self) -> bool {
        self.qualifier.is_some()
    }
}

impl fmt::Display for VarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}::{}", q, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl From<&str> for VarKey {
    fn from(s: &str) -> Self {
        VarKey::parse(s)
    }
}

impl From<String> for VarKey {
    fn from(s: String) -> Self {
        VarKey::parse(&s)
    }
}

/// Behavior switches for a variable binding
///
/// All flags default to off. Builder-style setters keep declaration sites
/// readable: `VarFlags::default().read_only()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarFlags {
    /// Writes after declaration are rejected
    pub read_only: bool,
    /// Advisory: value may change outside `set`; skipped by snapshot copies
    /// and by the type learner
    pub volatile: bool,
    /// Not visible through child-scope lookup fallthrough
    pub private: bool,
    /// Positional parameter binding
    pub parameter: bool,
    /// `set` on an unbound key declares it in the calling scope instead of
    /// failing with `Unbound`
    pub implicit_declare: bool,
}

impl VarFlags {
    /// Mark the binding read-only
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Mark the binding volatile
    pub fn volatile(mut self) -> Self {
        self.volatile = true;
        self
    }

    /// Hide the binding from child scopes
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    /// Mark the binding as a positional parameter
    pub fn parameter(mut self) -> Self {
        self.parameter = true;
        self
    }

    /// Allow `set` to declare the binding if it is unbound
    pub fn implicit_declare(mut self) -> Self {
        self.implicit_declare = true;
        self
    }
}
