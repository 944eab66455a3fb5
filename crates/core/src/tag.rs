//! Type tags for the Rill value model
//!
//! `ValueKind` discriminates the closed set of value tags. The set is frozen:
//! every `Value` variant has exactly one tag, and exhaustive matching on the
//! tag replaces runtime type checks everywhere else in the system.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type tag for a [`crate::Value`]
///
/// The tag set is closed. Adding a variant is a breaking change to the
/// portable encoding contract and to every exhaustive match in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Absence of a value (distinct from Null: "nothing here at all")
    Void,
    /// Explicit null
    Null,
    /// Boolean
    Bool,
    /// 64-bit signed integer
    Int,
    /// 64-bit IEEE-754 decimal
    Decimal,
    /// UTF-8 string
    Str,
    /// UTC timestamp
    Date,
    /// Inclusive lower/upper bound pair
    Range,
    /// Ordered sequence of values
    List,
    /// Insertion-ordered mapping with unique value keys
    Map,
    /// Block collection; the last element is the block result
    Block,
    /// URI reference to an external resource
    Uri,
    /// Deferred closure over values
    Lambda,
    /// Placeholder for a not-yet-computed result
    Future,
    /// Error carried as data
    Error,
    /// Signed infinity
    Infinity,
}

impl ValueKind {
    /// Human-readable tag name, used in coercion errors and diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Void => "void",
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Decimal => "decimal",
            ValueKind::Str => "string",
            ValueKind::Date => "date",
            ValueKind::Range => "range",
            ValueKind::List => "list",
            ValueKind::Map => "map",
            ValueKind::Block => "block",
            ValueKind::Uri => "uri",
            ValueKind::Lambda => "lambda",
            ValueKind::Future => "future",
            ValueKind::Error => "error",
            ValueKind::Infinity => "infinity",
        }
    }

    /// True for tags that participate in numeric arithmetic without coercion
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ValueKind::Int | ValueKind::Decimal | ValueKind::Infinity
        )
    }

    /// True for tags holding other values
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            ValueKind::List | ValueKind::Map | ValueKind::Block | ValueKind::Range
        )
    }

    /// Parse a tag from its `name()` rendering
    ///
    /// Used by the portable decoder; returns None for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "void" => ValueKind::Void,
            "null" => ValueKind::Null,
            "bool" => ValueKind::Bool,
            "int" => ValueKind::Int,
            "decimal" => ValueKind::Decimal,
            "string" => ValueKind::Str,
            "date" => ValueKind::Date,
            "range" => ValueKind::Range,
            "list" => ValueKind::List,
            "map" => ValueKind::Map,
            "block" => ValueKind::Block,
            "uri" => ValueKind::Uri,
            "lambda" => ValueKind::Lambda,
            "future" => ValueKind::Future,
            "error" => ValueKind::Error,
            "infinity" => ValueKind::Infinity,
            _ => return None,
        })
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ValueKind; 16] = [
        ValueKind::Void,
        ValueKind::Null,
        ValueKind::Bool,
        ValueKind::Int,
        ValueKind::Decimal,
        ValueKind::Str,
        ValueKind::Date,
        ValueKind::Range,
        ValueKind::List,
        ValueKind::Map,
        ValueKind::Block,
        ValueKind::Uri,
        ValueKind::Lambda,
        ValueKind::Future,
        ValueKind::Error,
        ValueKind::Infinity,
    ];

    #[test]
    fn test_name_round_trip() {
        for kind in ALL {
            assert_eq!(ValueKind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_from_name_unknown() {
        assert_eq!(ValueKind::from_name("frobnicate"), None);
        assert_eq!(ValueKind::from_name(""), None);
    }

    #[test]
    fn test_numeric_tags() {
        assert!(ValueKind::Int.is_numeric());
        assert!(ValueKind::Decimal.is_numeric());
        assert!(ValueKind::Infinity.is_numeric());
        assert!(!ValueKind::Str.is_numeric());
        assert!(!ValueKind::Bool.is_numeric());
    }

    #[test]
    fn test_collection_tags() {
        assert!(ValueKind::List.is_collection());
        assert!(ValueKind::Map.is_collection());
        assert!(ValueKind::Block.is_collection());
        assert!(ValueKind::Range.is_collection());
        assert!(!ValueKind::Int.is_collection());
    }

    #[test]
    fn test_display_matches_name() {
        assert_eq!(ValueKind::Lambda.to_string(), "lambda");
        assert_eq!(format!("{}", ValueKind::Decimal), "decimal");
    }
}
