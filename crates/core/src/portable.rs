//! Portable (JSON) encoding of values
//!
//! `to_portable`/`from_portable` is the stable contract serialization
//! collaborators consume. JSON-native tags map directly; everything else
//! rides in a `{"$kind": ...}` envelope. The encoding round-trips every tag
//! except `lambda` and `future` (opaque sentinels a collaborator must encode
//! itself) and an error value's cause chain (the kind and message survive,
//! the chain does not).
//!
//! Maps always use the envelope (`entries` pair list) because map keys are
//! full values, not strings. A plain JSON object fed *into* `from_portable`
//! is accepted as a string-keyed map for collaborator convenience.

use crate::error::{ErrorKind, ErrorValue};
use crate::value::{Value, ValueMap, ValueRange, ValueUri};
use chrono::{DateTime, Utc};
use serde_json::{json, Value as Json};

fn decode_error(message: impl Into<String>) -> ErrorValue {
    ErrorValue::new(ErrorKind::Coercion, message)
}

impl Value {
    /// Encode into the portable JSON form
    pub fn to_portable(&self) -> Json {
        match self {
            Value::Void => json!({ "$kind": "void" }),
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => json!(i),
            Value::Decimal(d) => match serde_json::Number::from_f64(*d) {
                Some(n) => Json::Number(n),
                // NaN and infinities have no JSON number; carry the bits as text
                None => json!({ "$kind": "decimal", "text": d.to_string() }),
            },
            Value::Str(s) => Json::String(s.clone()),
            Value::Date(d) => json!({ "$kind": "date", "value": d.to_rfc3339() }),
            Value::Range(r) => json!({
                "$kind": "range",
                "from": r.from.to_portable(),
                "to": r.to.to_portable(),
            }),
            Value::List(items) => {
                Json::Array(items.iter().map(Value::to_portable).collect())
            }
            Value::Block(items) => json!({
                "$kind": "block",
                "items": items.iter().map(Value::to_portable).collect::<Vec<_>>(),
            }),
            Value::Map(map) => json!({
                "$kind": "map",
                "entries": map
                    .iter()
                    .map(|(k, v)| json!([k.to_portable(), v.to_portable()]))
                    .collect::<Vec<_>>(),
            }),
            Value::Uri(uri) => json!({ "$kind": "uri", "value": uri.to_string() }),
            Value::Lambda(_) => json!({ "$kind": "lambda" }),
            Value::Future(_) => json!({ "$kind": "future" }),
            Value::Error(e) => json!({
                "$kind": "error",
                "error": e.kind.name(),
                "message": e.message,
            }),
            Value::Infinity { positive } => {
                json!({ "$kind": "infinity", "positive": positive })
            }
        }
    }

    /// Decode the portable JSON form
    ///
    /// Fails on malformed envelopes and on the opaque `lambda`/`future`
    /// sentinels, which only their producer can reconstruct.
    pub fn from_portable(json: &Json) -> Result<Value, ErrorValue> {
        match json {
            Json::Null => Ok(Value::Null),
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i))
                } else if let Some(d) = n.as_f64() {
                    Ok(Value::Decimal(d))
                } else {
                    Err(decode_error(format!("unrepresentable number: {n}")))
                }
            }
            Json::String(s) => Ok(Value::Str(s.clone())),
            Json::Array(items) => {
                let decoded = items
                    .iter()
                    .map(Value::from_portable)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::list(decoded))
            }
            Json::Object(fields) => match fields.get("$kind").and_then(Json::as_str) {
                Some(kind) => decode_envelope(kind, fields),
                // plain object from a collaborator: string-keyed map
                None => {
                    let mut map = ValueMap::new();
                    for (k, v) in fields {
                        map.insert(Value::text(k.clone()), Value::from_portable(v)?);
                    }
                    Ok(Value::map(map))
                }
            },
        }
    }
}

fn decode_envelope(
    kind: &str,
    fields: &serde_json::Map<String, Json>,
) -> Result<Value, ErrorValue> {
    let field = |name: &str| {
        fields
            .get(name)
            .ok_or_else(|| decode_error(format!("{kind} envelope missing {name:?}")))
    };
    match kind {
        "void" => Ok(Value::Void),
        "decimal" => {
            let text = field("text")?
                .as_str()
                .ok_or_else(|| decode_error("decimal text must be a string"))?;
            text.parse::<f64>()
                .map(Value::Decimal)
                .map_err(|_| decode_error(format!("bad decimal text: {text:?}")))
        }
        "date" => {
            let text = field("value")?
                .as_str()
                .ok_or_else(|| decode_error("date value must be a string"))?;
            DateTime::parse_from_rfc3339(text)
                .map(|d| Value::Date(d.with_timezone(&Utc)))
                .map_err(|_| decode_error(format!("bad date: {text:?}")))
        }
        "range" => {
            let from = Value::from_portable(field("from")?)?;
            let to = Value::from_portable(field("to")?)?;
            Ok(Value::Range(Box::new(ValueRange::new(from, to))))
        }
        "block" => {
            let items = field("items")?
                .as_array()
                .ok_or_else(|| decode_error("block items must be an array"))?;
            let decoded = items
                .iter()
                .map(Value::from_portable)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::block(decoded))
        }
        "map" => {
            let entries = field("entries")?
                .as_array()
                .ok_or_else(|| decode_error("map entries must be an array"))?;
            let mut map = ValueMap::new();
            for entry in entries {
                let pair = entry
                    .as_array()
                    .filter(|p| p.len() == 2)
                    .ok_or_else(|| decode_error("map entry must be a [key, value] pair"))?;
                map.insert(
                    Value::from_portable(&pair[0])?,
                    Value::from_portable(&pair[1])?,
                );
            }
            Ok(Value::map(map))
        }
        "uri" => {
            let text = field("value")?
                .as_str()
                .ok_or_else(|| decode_error("uri value must be a string"))?;
            ValueUri::parse(text).map(Value::Uri)
        }
        "error" => {
            let name = field("error")?
                .as_str()
                .ok_or_else(|| decode_error("error kind must be a string"))?;
            let error_kind = ErrorKind::from_name(name)
                .ok_or_else(|| decode_error(format!("unknown error kind: {name:?}")))?;
            let message = field("message")?
                .as_str()
                .ok_or_else(|| decode_error("error message must be a string"))?;
            Ok(Value::error(error_kind, message))
        }
        "infinity" => {
            let positive = field("positive")?
                .as_bool()
                .ok_or_else(|| decode_error("infinity sign must be a bool"))?;
            Ok(Value::Infinity { positive })
        }
        "lambda" | "future" => Err(decode_error(format!(
            "opaque {kind} sentinel cannot be decoded"
        ))),
        other => Err(decode_error(format!("unknown envelope kind: {other:?}"))),
    }
}
