//! Coercion lattice, arithmetic, and ordering for [`Value`]
//!
//! Operators between mismatched tags follow a fixed lattice - never silent
//! truncation. Failures surface as data: arithmetic returns an error *value*
//! (tag = error) so pipelines can carry the failure without unwinding, while
//! the accessor coercions (`to_int`, ...) return a typed [`CoercionError`].
//!
//! ## Lattice (per pair)
//!
//! - `error ⊕ x` / `x ⊕ error` - the error value propagates (left first)
//! - `null ⊕ x` - null absorbs; `void` in a numeric position - coercion error
//! - `int ⊕ int` - checked 64-bit; overflow is an arithmetic error
//! - `int ⊕ decimal` (either side) - decimal
//! - `bool` in numeric position - 0/1
//! - `infinity ⊕ finite` - infinity with sign rules; `∞ - ∞`, `0 × ∞` and
//!   `∞ ⊕ ∞` of opposite sign are arithmetic errors
//! - `string + x` - concatenation of the right side's rendering
//! - `list + list` - concatenation; `list + x` - append; `list - x` -
//!   removes every equal element
//! - `map + map` - merge, right side wins; `map - key` - removal
//! - `date ± int/decimal` - seconds offset; `date - date` - seconds
//! - `int / int` - exact quotient stays int, otherwise decimal;
//!   `x / 0` - infinity with the numerator's sign; `0 / 0` - error
//! - anything else - coercion error
//!
//! Ordering (`try_compare`) is defined for numeric tags (by value, with
//! infinity at the extremes), strings, booleans, dates, and lists
//! (element-wise). Incomparable tags return a `CoercionError` rather than an
//! undefined ordering.

use crate::error::{CoercionError, ErrorKind, ErrorValue};
use crate::tag::ValueKind;
use crate::value::{Value, ValueMap, ValueUri};
use chrono::{DateTime, TimeZone, Utc};
use std::cmp::Ordering;
use std::ops;

impl Value {
    // =========================================================================
    // Accessor coercions
    // =========================================================================

    /// Coerce to a 64-bit integer
    ///
    /// Decimals convert only when they are whole; strings parse; booleans
    /// map to 0/1; dates give epoch seconds.
    pub fn to_int(&self) -> Result<i64, CoercionError> {
        let refuse = || CoercionError::new(self.kind(), ValueKind::Int);
        match self {
            Value::Int(i) => Ok(*i),
            Value::Decimal(d) if d.fract() == 0.0 && d.is_finite() => Ok(*d as i64),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Str(s) => s.trim().parse::<i64>().map_err(|_| refuse()),
            Value::Date(d) => Ok(d.timestamp()),
            _ => Err(refuse()),
        }
    }

    /// Coerce to a decimal
    pub fn to_decimal(&self) -> Result<f64, CoercionError> {
        let refuse = || CoercionError::new(self.kind(), ValueKind::Decimal);
        match self {
            Value::Decimal(d) => Ok(*d),
            Value::Int(i) => Ok(*i as f64),
            Value::Bool(b) => Ok(f64::from(u8::from(*b))),
            Value::Str(s) => s.trim().parse::<f64>().map_err(|_| refuse()),
            Value::Infinity { positive: true } => Ok(f64::INFINITY),
            Value::Infinity { positive: false } => Ok(f64::NEG_INFINITY),
            _ => Err(refuse()),
        }
    }

    /// Coerce to a boolean; only bools, 0/1 integers, and the literal
    /// strings `true`/`false` convert
    pub fn to_bool(&self) -> Result<bool, CoercionError> {
        let refuse = || CoercionError::new(self.kind(), ValueKind::Bool);
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            Value::Str(s) if s == "true" => Ok(true),
            Value::Str(s) if s == "false" => Ok(false),
            _ => Err(refuse()),
        }
    }

    /// Total text rendering (the `Display` form)
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// Coerce to a list
    ///
    /// Lists and blocks yield their items, an integer range expands, void is
    /// empty, and any scalar wraps into a one-element list. Total.
    pub fn to_list(&self) -> Vec<Value> {
        match self {
            Value::List(items) | Value::Block(items) => items.as_ref().clone(),
            Value::Range(r) => match (&r.from, &r.to) {
                (Value::Int(a), Value::Int(b)) if b >= a => (*a..=*b).map(Value::Int).collect(),
                _ => vec![self.clone()],
            },
            Value::Void => Vec::new(),
            other => vec![other.clone()],
        }
    }

    /// Coerce to a map; only map values convert
    pub fn to_map(&self) -> Result<ValueMap, CoercionError> {
        match self {
            Value::Map(map) => Ok(map.as_ref().clone()),
            _ => Err(CoercionError::new(self.kind(), ValueKind::Map)),
        }
    }

    /// Coerce to a date; strings parse RFC-3339, integers are epoch seconds
    pub fn to_date(&self) -> Result<DateTime<Utc>, CoercionError> {
        let refuse = || CoercionError::new(self.kind(), ValueKind::Date);
        match self {
            Value::Date(d) => Ok(*d),
            Value::Str(s) => DateTime::parse_from_rfc3339(s)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|_| refuse()),
            Value::Int(secs) => Utc.timestamp_opt(*secs, 0).single().ok_or_else(refuse),
            _ => Err(refuse()),
        }
    }

    /// Coerce to a URI; strings parse as `scheme:path`
    pub fn to_uri(&self) -> Result<ValueUri, CoercionError> {
        match self {
            Value::Uri(uri) => Ok(uri.clone()),
            Value::Str(s) => {
                ValueUri::parse(s).map_err(|_| CoercionError::new(self.kind(), ValueKind::Uri))
            }
            _ => Err(CoercionError::new(self.kind(), ValueKind::Uri)),
        }
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    /// Compare two values, or report why they are incomparable
    pub fn try_compare(&self, other: &Value) -> Result<Ordering, CoercionError> {
        let incomparable = || CoercionError::new(self.kind(), other.kind());
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Ok(a.cmp(b)),
            (Value::Infinity { positive: a }, Value::Infinity { positive: b }) => Ok(a.cmp(b)),
            // infinity bounds every numeric
            (Value::Infinity { positive }, b) if b.kind().is_numeric() => {
                Ok(if *positive {
                    Ordering::Greater
                } else {
                    Ordering::Less
                })
            }
            (a, Value::Infinity { positive }) if a.kind().is_numeric() => {
                Ok(if *positive {
                    Ordering::Less
                } else {
                    Ordering::Greater
                })
            }
            (a, b) if a.kind().is_numeric() && b.kind().is_numeric() => {
                let (x, y) = (a.to_decimal()?, b.to_decimal()?);
                x.partial_cmp(&y).ok_or_else(incomparable)
            }
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.try_compare(y)? {
                        Ordering::Equal => continue,
                        unequal => return Ok(unequal),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => Err(incomparable()),
        }
    }
}

// ============================================================================
// Arithmetic
// ============================================================================

fn arithmetic_error(message: impl Into<String>) -> Value {
    Value::error(ErrorKind::Arithmetic, message)
}

fn coercion_value_error(lhs: &Value, op: &str, rhs: &Value) -> Value {
    Value::from_error(ErrorValue::new(
        ErrorKind::Coercion,
        format!("no {op} between {} and {}", lhs.kind(), rhs.kind()),
    ))
}

/// Numeric views the lattice dispatches on
#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Decimal(f64),
    Infinity(bool),
}

fn numeric_view(v: &Value) -> Option<Num> {
    match v {
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Decimal(d) => Some(Num::Decimal(*d)),
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Infinity { positive } => Some(Num::Infinity(*positive)),
        _ => None,
    }
}

fn infinity(positive: bool) -> Value {
    Value::Infinity { positive }
}

fn numeric_add(a: Num, b: Num) -> Value {
    match (a, b) {
        (Num::Infinity(p), Num::Infinity(q)) if p == q => infinity(p),
        (Num::Infinity(_), Num::Infinity(_)) => arithmetic_error("infinity minus infinity"),
        (Num::Infinity(p), _) | (_, Num::Infinity(p)) => infinity(p),
        (Num::Int(x), Num::Int(y)) => match x.checked_add(y) {
            Some(sum) => Value::Int(sum),
            None => arithmetic_error("integer overflow in add"),
        },
        (x, y) => Value::Decimal(as_f64(x) + as_f64(y)),
    }
}

fn numeric_mul(a: Num, b: Num) -> Value {
    let zero = |n: &Num| matches!(n, Num::Int(0)) || matches!(n, Num::Decimal(d) if *d == 0.0);
    match (&a, &b) {
        (Num::Infinity(_), n) | (n, Num::Infinity(_)) if zero(n) => {
            arithmetic_error("zero times infinity")
        }
        (Num::Infinity(p), other) | (other, Num::Infinity(p)) => {
            infinity(*p == !is_negative(other))
        }
        (Num::Int(x), Num::Int(y)) => match x.checked_mul(*y) {
            Some(product) => Value::Int(product),
            None => arithmetic_error("integer overflow in multiply"),
        },
        _ => Value::Decimal(as_f64(a) * as_f64(b)),
    }
}

fn as_f64(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Decimal(d) => d,
        Num::Infinity(true) => f64::INFINITY,
        Num::Infinity(false) => f64::NEG_INFINITY,
    }
}

fn is_negative(n: &Num) -> bool {
    match n {
        Num::Int(i) => *i < 0,
        Num::Decimal(d) => *d < 0.0,
        Num::Infinity(positive) => !positive,
    }
}

/// Shared entry guards: error propagation, null absorption, void refusal
///
/// Returns the short-circuit result, or None when the operands reach the
/// per-operator lattice.
fn preflight(lhs: &Value, rhs: &Value) -> Option<Value> {
    if lhs.is_error() {
        return Some(lhs.clone());
    }
    if rhs.is_error() {
        return Some(rhs.clone());
    }
    if lhs.is_null() || rhs.is_null() {
        return Some(Value::Null);
    }
    None
}

impl ops::Add for &Value {
    type Output = Value;

    fn add(self, rhs: &Value) -> Value {
        if let Some(short) = preflight(self, rhs) {
            return short;
        }
        match (self, rhs) {
            (Value::Str(a), b) => Value::Str(format!("{a}{b}")),
            (Value::List(a), Value::List(b)) => {
                Value::list(a.iter().chain(b.iter()).cloned().collect::<Vec<_>>())
            }
            (Value::List(a), b) => {
                let mut items = a.as_ref().clone();
                items.push(b.clone());
                Value::list(items)
            }
            (Value::Map(a), Value::Map(b)) => Value::map(a.merged(b)),
            (Value::Date(d), b) if numeric_view(b).is_some() => match b.to_decimal() {
                Ok(secs) => Value::Date(
                    *d + chrono::Duration::milliseconds((secs * 1000.0) as i64),
                ),
                Err(_) => coercion_value_error(self, "add", rhs),
            },
            (a, b) => match (numeric_view(a), numeric_view(b)) {
                (Some(x), Some(y)) => numeric_add(x, y),
                _ => coercion_value_error(self, "add", rhs),
            },
        }
    }
}

impl ops::Sub for &Value {
    type Output = Value;

    fn sub(self, rhs: &Value) -> Value {
        if let Some(short) = preflight(self, rhs) {
            return short;
        }
        match (self, rhs) {
            (Value::List(a), b) => Value::list(
                a.iter().filter(|item| *item != b).cloned().collect::<Vec<_>>(),
            ),
            (Value::Map(a), key) => {
                let remaining = a
                    .iter()
                    .filter(|(k, _)| *k != key)
                    .map(|(k, v)| (k.clone(), v.clone()));
                Value::map(ValueMap::from_entries(remaining))
            }
            (Value::Date(a), Value::Date(b)) => Value::Int((*a - *b).num_seconds()),
            (Value::Date(d), b) if numeric_view(b).is_some() => match b.to_decimal() {
                Ok(secs) => Value::Date(
                    *d - chrono::Duration::milliseconds((secs * 1000.0) as i64),
                ),
                Err(_) => coercion_value_error(self, "subtract", rhs),
            },
            (a, b) => match (numeric_view(a), numeric_view(b)) {
                (Some(x), Some(y)) => numeric_add(x, negate_num(y)),
                _ => coercion_value_error(self, "subtract", rhs),
            },
        }
    }
}

fn negate_num(n: Num) -> Num {
    match n {
        Num::Int(i) => match i.checked_neg() {
            Some(negated) => Num::Int(negated),
            // i64::MIN has no integer negation; widen instead of wrapping
            None => Num::Decimal(-(i as f64)),
        },
        Num::Decimal(d) => Num::Decimal(-d),
        Num::Infinity(positive) => Num::Infinity(!positive),
    }
}

impl ops::Mul for &Value {
    type Output = Value;

    fn mul(self, rhs: &Value) -> Value {
        if let Some(short) = preflight(self, rhs) {
            return short;
        }
        match (self, rhs) {
            (Value::Str(s), Value::Int(n)) if *n >= 0 => Value::Str(s.repeat(*n as usize)),
            (Value::List(items), Value::Int(n)) if *n >= 0 => {
                let mut out = Vec::with_capacity(items.len() * *n as usize);
                for _ in 0..*n {
                    out.extend(items.iter().cloned());
                }
                Value::list(out)
            }
            (a, b) => match (numeric_view(a), numeric_view(b)) {
                (Some(x), Some(y)) => numeric_mul(x, y),
                _ => coercion_value_error(self, "multiply", rhs),
            },
        }
    }
}

impl ops::Div for &Value {
    type Output = Value;

    fn div(self, rhs: &Value) -> Value {
        if let Some(short) = preflight(self, rhs) {
            return short;
        }
        let (a, b) = match (numeric_view(self), numeric_view(rhs)) {
            (Some(a), Some(b)) => (a, b),
            _ => return coercion_value_error(self, "divide", rhs),
        };
        let divisor_zero =
            matches!(b, Num::Int(0)) || matches!(b, Num::Decimal(d) if d == 0.0);
        if divisor_zero {
            return match &a {
                n if is_zero(n) => arithmetic_error("zero divided by zero"),
                n => infinity(!is_negative(n)),
            };
        }
        match (a, b) {
            (Num::Infinity(_), Num::Infinity(_)) => {
                arithmetic_error("infinity divided by infinity")
            }
            (Num::Infinity(p), d) => infinity(p == !is_negative(&d)),
            (_, Num::Infinity(_)) => Value::Int(0),
            (Num::Int(x), Num::Int(y)) if x % y == 0 => Value::Int(x / y),
            (x, y) => Value::Decimal(as_f64(x) / as_f64(y)),
        }
    }
}

fn is_zero(n: &Num) -> bool {
    matches!(n, Num::Int(0)) || matches!(n, Num::Decimal(d) if *d == 0.0)
}

impl ops::Rem for &Value {
    type Output = Value;

    fn rem(self, rhs: &Value) -> Value {
        if let Some(short) = preflight(self, rhs) {
            return short;
        }
        match (numeric_view(self), numeric_view(rhs)) {
            (Some(_), Some(n)) if is_zero(&n) => arithmetic_error("remainder by zero"),
            (Some(Num::Int(x)), Some(Num::Int(y))) => Value::Int(x % y),
            (Some(x), Some(y)) => Value::Decimal(as_f64(x) % as_f64(y)),
            _ => coercion_value_error(self, "remainder", rhs),
        }
    }
}

impl ops::Neg for &Value {
    type Output = Value;

    fn neg(self) -> Value {
        match self {
            Value::Error(_) => self.clone(),
            Value::Null => Value::Null,
            Value::Int(i) => match i.checked_neg() {
                Some(n) => Value::Int(n),
                None => arithmetic_error("integer overflow in negate"),
            },
            Value::Decimal(d) => Value::Decimal(-d),
            Value::Bool(b) => Value::Int(-i64::from(*b)),
            Value::Infinity { positive } => infinity(!positive),
            _ => Value::from_error(ErrorValue::new(
                ErrorKind::Coercion,
                format!("cannot negate {}", self.kind()),
            )),
        }
    }
}
