//! Value model properties through the facade

use chrono::TimeZone;
use proptest::prelude::*;
use rill::{ErrorKind, Value, ValueKind, ValueMap};

#[test]
fn error_values_flow_as_data() {
    // error-as-value is distinct from a propagated failure: arithmetic over
    // an error value keeps carrying it, nothing unwinds
    let err = Value::error(ErrorKind::Business, "inventory empty");
    let carried = &(&err + &Value::Int(1)) * &Value::Int(2);
    assert_eq!(
        carried.as_error().map(|e| e.kind),
        Some(ErrorKind::Business)
    );
    assert!(!carried.truthy());
}

#[test]
fn coercion_lattice_never_truncates() {
    // a fractional decimal does not silently become an integer
    let err = Value::Decimal(2.5).to_int().unwrap_err();
    assert_eq!(err.from, ValueKind::Decimal);
    assert_eq!(err.to, ValueKind::Int);

    // whole decimals convert exactly
    assert_eq!(Value::Decimal(4.0).to_int(), Ok(4));
}

#[test]
fn incomparable_tags_are_an_error_not_an_ordering() {
    let err = Value::text("a")
        .try_compare(&Value::list(vec![]))
        .unwrap_err();
    assert_eq!(err.from, ValueKind::Str);
    assert_eq!(err.to, ValueKind::List);
}

#[test]
fn portable_round_trip_all_concrete_tags() {
    let map = ValueMap::from_entries([
        (Value::Int(1), Value::text("one")),
        (Value::text("nested"), Value::list(vec![Value::Bool(true)])),
    ]);
    for v in [
        Value::Void,
        Value::Null,
        Value::Bool(false),
        Value::Int(-42),
        Value::Decimal(6.25),
        Value::text("text"),
        Value::range(Value::Int(0), Value::infinity()),
        Value::list(vec![Value::Null, Value::Int(1)]),
        Value::map(map),
        Value::block(vec![Value::Int(1), Value::Int(2)]),
        Value::Uri(rill::ValueUri::new("mem", "cell/1")),
        Value::error(ErrorKind::Validation, "rejected"),
        Value::negative_infinity(),
    ] {
        let decoded = Value::from_portable(&v.to_portable()).unwrap();
        assert_eq!(decoded, v, "round trip changed {v}");
    }
}

#[test]
fn dates_round_trip_and_offset() {
    let date = chrono::Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
    let v = Value::Date(date);
    assert_eq!(Value::from_portable(&v.to_portable()).unwrap(), v);

    let hour_later = &v + &Value::Int(3600);
    assert_eq!(&hour_later - &v, Value::Int(3600));
}

#[test]
fn lambda_and_future_encode_as_sentinels() {
    let lambda = Value::lambda(|_| Value::Void);
    let encoded = lambda.to_portable();
    assert_eq!(encoded["$kind"], "lambda");
    assert!(Value::from_portable(&encoded).is_err());

    let future = Value::Future(rill::FutureValue::new());
    let encoded = future.to_portable();
    assert_eq!(encoded["$kind"], "future");
    assert!(Value::from_portable(&encoded).is_err());
}

proptest! {
    #[test]
    fn numeric_equality_is_cross_tag(n in -1_000_000i64..1_000_000) {
        prop_assert_eq!(Value::Int(n), Value::Decimal(n as f64));
    }

    #[test]
    fn addition_matches_host_arithmetic(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
        prop_assert_eq!(&Value::Int(a) + &Value::Int(b), Value::Int(a + b));
    }
}
