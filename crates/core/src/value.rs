//! The Rill value model
//!
//! `Value` is the unit every computation produces and consumes: an immutable
//! tagged union over the closed [`ValueKind`] set. "Mutation" always builds a
//! new value; collections share their backing storage through `Arc` so
//! cloning stays cheap.
//!
//! ## Equality
//!
//! Equality is defined per tag. The numeric tags compare by value across
//! `Int`/`Decimal` (`Int(1) == Decimal(1.0)`), decimals keep IEEE-754
//! semantics (`NaN != NaN`, `-0.0 == 0.0`), maps compare order-insensitively,
//! and lambdas/futures compare by identity. Ordering lives in
//! [`Value::try_compare`](crate::Value::try_compare) and is fallible:
//! incomparable tags are a [`CoercionError`](crate::CoercionError), never an
//! arbitrary ordering.
//!
//! ## Errors as data
//!
//! A `Value::Error` is an ordinary value. Pipelines carry failures as data
//! and decide themselves whether to short-circuit; only faults travel the
//! unrecoverable channel (see [`crate::error`]).

use crate::error::{CoercionError, ErrorKind, ErrorValue};
use crate::future::FutureValue;
use crate::tag::ValueKind;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Deferred closure over values
///
/// The payload of a `Value::Lambda`: an opaque, re-invocable function from
/// arguments to a value. Identity equality; two lambdas are equal only when
/// they share the same allocation.
#[derive(Clone)]
pub struct LambdaValue {
    f: Arc<dyn Fn(&[Value]) -> Value + Send + Sync>,
}

impl LambdaValue {
    /// Wrap a closure as a lambda value
    pub fn new(f: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f) }
    }

    /// Invoke the lambda
    pub fn apply(&self, args: &[Value]) -> Value {
        (self.f)(args)
    }
}

impl PartialEq for LambdaValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.f, &other.f)
    }
}

impl fmt::Debug for LambdaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<lambda>")
    }
}

/// Inclusive lower/upper bound pair
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    /// Inclusive lower bound
    pub from: Value,
    /// Inclusive upper bound
    pub to: Value,
}

impl ValueRange {
    /// Build a range from two bounds
    pub fn new(from: Value, to: Value) -> Self {
        Self { from, to }
    }

    /// True when `candidate` lies within the bounds (inclusive)
    ///
    /// Fails when the candidate is not comparable with the bounds.
    pub fn contains(&self, candidate: &Value) -> Result<bool, CoercionError> {
        let above = self.from.try_compare(candidate)? != std::cmp::Ordering::Greater;
        let below = candidate.try_compare(&self.to)? != std::cmp::Ordering::Greater;
        Ok(above && below)
    }

    /// Number of integers covered by an integer range; None otherwise
    pub fn size(&self) -> Option<i64> {
        match (&self.from, &self.to) {
            (Value::Int(a), Value::Int(b)) if b >= a => Some(b - a + 1),
            _ => None,
        }
    }
}

/// Insertion-ordered mapping with unique value keys
///
/// Keys are full values, so the backing store is an ordered pair list rather
/// than a hash map (decimals have no total hash). Lookup is linear, which
/// matches the small maps the expression layer builds. Equality is
/// order-insensitive.
#[derive(Debug, Clone, Default)]
pub struct ValueMap {
    entries: Vec<(Value, Value)>,
}

impl ValueMap {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from entries; a repeated key keeps its first position and takes
    /// the last value
    pub fn from_entries(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let mut map = Self::new();
        for (k, v) in entries {
            map.insert(k, v);
        }
        map
    }

    /// Insert or replace, preserving the original position of a replaced key
    pub fn insert(&mut self, key: Value, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Value for `key`, if present
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// True if `key` is present
    pub fn contains_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the map has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Values in insertion order
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// New map with all entries of `self`, then all of `other` (other wins
    /// on key collision)
    pub fn merged(&self, other: &ValueMap) -> ValueMap {
        let mut out = self.clone();
        for (k, v) in other.iter() {
            out.insert(k.clone(), v.clone());
        }
        out
    }
}

impl PartialEq for ValueMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl FromIterator<(Value, Value)> for ValueMap {
    fn from_iter<T: IntoIterator<Item = (Value, Value)>>(iter: T) -> Self {
        Self::from_entries(iter)
    }
}

/// URI reference addressing an external resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueUri {
    /// Scheme selecting the resource handler (`mem`, `http`, ...)
    pub scheme: String,
    /// Everything after the first `:`
    pub path: String,
}

impl ValueUri {
    /// Build from parts
    pub fn new(scheme: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            path: path.into(),
        }
    }

    /// Parse `scheme:path`; fails without a non-empty scheme
    pub fn parse(text: &str) -> Result<Self, ErrorValue> {
        match text.split_once(':') {
            Some((scheme, path)) if !scheme.is_empty() => Ok(Self::new(scheme, path)),
            _ => Err(ErrorValue::new(
                ErrorKind::Resource,
                format!("malformed uri: {text:?}"),
            )),
        }
    }
}

impl fmt::Display for ValueUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.path)
    }
}

/// Immutable tagged dynamic value
///
/// See the module docs for the equality contract. Arithmetic, ordering and
/// coercion live in the `coerce` module; portable encoding in `portable`.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absence of a value
    Void,
    /// Explicit null
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit IEEE-754 decimal
    Decimal(f64),
    /// UTF-8 string
    Str(String),
    /// UTC timestamp
    Date(DateTime<Utc>),
    /// Inclusive bound pair
    Range(Box<ValueRange>),
    /// Ordered sequence
    List(Arc<Vec<Value>>),
    /// Insertion-ordered unique-key mapping
    Map(Arc<ValueMap>),
    /// Block collection; the last element is the block result
    Block(Arc<Vec<Value>>),
    /// Resource reference
    Uri(ValueUri),
    /// Deferred closure
    Lambda(LambdaValue),
    /// Not-yet-computed result
    Future(FutureValue),
    /// Error carried as data
    Error(Box<ErrorValue>),
    /// Signed infinity
    Infinity {
        /// Sign; `false` is negative infinity
        positive: bool,
    },
}

impl Value {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// String value from anything string-like
    pub fn text(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// List value
    pub fn list(items: impl Into<Vec<Value>>) -> Self {
        Value::List(Arc::new(items.into()))
    }

    /// Map value
    pub fn map(map: ValueMap) -> Self {
        Value::Map(Arc::new(map))
    }

    /// Block value
    pub fn block(items: impl Into<Vec<Value>>) -> Self {
        Value::Block(Arc::new(items.into()))
    }

    /// Range value
    pub fn range(from: Value, to: Value) -> Self {
        Value::Range(Box::new(ValueRange::new(from, to)))
    }

    /// Lambda value from a closure
    pub fn lambda(f: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> Self {
        Value::Lambda(LambdaValue::new(f))
    }

    /// Error value from a kind and message
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Value::Error(Box::new(ErrorValue::new(kind, message)))
    }

    /// Error value from an existing [`ErrorValue`]
    pub fn from_error(error: ErrorValue) -> Self {
        Value::Error(Box::new(error))
    }

    /// Positive infinity
    pub fn infinity() -> Self {
        Value::Infinity { positive: true }
    }

    /// Negative infinity
    pub fn negative_infinity() -> Self {
        Value::Infinity { positive: false }
    }

    // =========================================================================
    // Tags and checks
    // =========================================================================

    /// The type tag of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Void => ValueKind::Void,
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Decimal(_) => ValueKind::Decimal,
            Value::Str(_) => ValueKind::Str,
            Value::Date(_) => ValueKind::Date,
            Value::Range(_) => ValueKind::Range,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
            Value::Block(_) => ValueKind::Block,
            Value::Uri(_) => ValueKind::Uri,
            Value::Lambda(_) => ValueKind::Lambda,
            Value::Future(_) => ValueKind::Future,
            Value::Error(_) => ValueKind::Error,
            Value::Infinity { .. } => ValueKind::Infinity,
        }
    }

    /// True for `Void`
    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    /// True for `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for `Void` or `Null`
    pub fn is_nothing(&self) -> bool {
        matches!(self, Value::Void | Value::Null)
    }

    /// True when this value carries an error as data
    ///
    /// Callers must check this alongside the fatal-signal channel: a value
    /// may itself represent a failure without anything having been thrown.
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// True for a future placeholder
    pub fn is_future(&self) -> bool {
        matches!(self, Value::Future(_))
    }

    /// The carried error, if this is an error value
    pub fn as_error(&self) -> Option<&ErrorValue> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Truthiness used by conditional operators
    ///
    /// Numbers are true when non-zero, strings and collections when
    /// non-empty, `Null`/`Void` and error values are false, infinity is
    /// true, and a future is true only once resolved to a truthy value.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Void | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Decimal(d) => *d != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Date(_) => true,
            Value::Range(_) => true,
            Value::List(items) | Value::Block(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Uri(_) => true,
            Value::Lambda(_) => true,
            Value::Future(f) => f
                .poll()
                .and_then(|s| s.value().map(Value::truthy))
                .unwrap_or(false),
            Value::Error(_) => false,
            Value::Infinity { .. } => true,
        }
    }

    // =========================================================================
    // Forcing deferred values
    // =========================================================================

    /// Force one level of deferral
    ///
    /// A lambda is applied with no arguments; a settled future collapses to
    /// its settlement. Anything else (including an unsettled future) is
    /// returned unchanged.
    pub fn fix(&self) -> Value {
        match self {
            Value::Lambda(lambda) => lambda.apply(&[]),
            Value::Future(future) => match future.poll() {
                Some(settled) => settled.into_value(),
                None => self.clone(),
            },
            _ => self.clone(),
        }
    }

    /// Force deferral recursively through collections
    pub fn fix_deep(&self) -> Value {
        match self {
            Value::Lambda(_) | Value::Future(_) => self.fix().fix_deep(),
            Value::List(items) => Value::list(items.iter().map(Value::fix_deep).collect::<Vec<_>>()),
            Value::Block(items) => {
                Value::block(items.iter().map(Value::fix_deep).collect::<Vec<_>>())
            }
            Value::Map(map) => Value::map(ValueMap::from_entries(
                map.iter().map(|(k, v)| (k.fix_deep(), v.fix_deep())),
            )),
            _ => self.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // numeric tags compare by value, decimals keep IEEE-754 semantics
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Int(a), Value::Decimal(b)) | (Value::Decimal(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Block(a), Value::Block(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Uri(a), Value::Uri(b)) => a == b,
            (Value::Lambda(a), Value::Lambda(b)) => a == b,
            (Value::Future(a), Value::Future(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Infinity { positive: a }, Value::Infinity { positive: b }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{}", d.to_rfc3339()),
            Value::Range(r) => write!(f, "{}..{}", r.from, r.to),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Block(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "}}")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Uri(uri) => write!(f, "{uri}"),
            Value::Lambda(_) => write!(f, "<lambda>"),
            Value::Future(future) => write!(f, "{future:?}"),
            Value::Error(e) => write!(f, "<error {e}>"),
            Value::Infinity { positive: true } => write!(f, "infinity"),
            Value::Infinity { positive: false } => write!(f, "-infinity"),
        }
    }
}

// ============================================================================
// From implementations for ergonomic construction
// ============================================================================

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Decimal(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::map(map)
    }
}

impl From<ValueUri> for Value {
    fn from(uri: ValueUri) -> Self {
        Value::Uri(uri)
    }
}

impl From<ErrorValue> for Value {
    fn from(e: ErrorValue) -> Self {
        Value::from_error(e)
    }
}

impl From<FutureValue> for Value {
    fn from(future: FutureValue) -> Self {
        Value::Future(future)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Void
    }
}
