//! Scope, guard, and listener behavior through the facade

use parking_lot::Mutex;
use rill::guard::{NotNull, NotNullElements};
use rill::{
    mount_module, GuardChain, Scope, SetError, Signal, StateTracer, StaticResolver, TypeLearner,
    Value, ValueKind, VarFlags, VarKey,
};
use std::sync::Arc;

#[test]
fn guarded_write_rejection_is_observable_data() {
    // not-null guard on x: setting null names the guard and
    // leaves the prior value readable
    let scope = Scope::root("main");
    scope
        .declare(
            "x",
            Value::Int(7),
            GuardChain::builder().push(NotNull).push(NotNullElements).build(),
            VarFlags::default(),
        )
        .unwrap();

    match scope.set("x", Value::Null) {
        Err(SetError::Violation(violation)) => {
            assert_eq!(violation.guard, "not-null");
            assert_eq!(violation.rejected, Value::Null);
            assert_eq!(violation.key, VarKey::new("x"));
        }
        other => panic!("expected violation, got {other:?}"),
    }
    assert_eq!(scope.lookup(&"x".into()), Some(Value::Int(7)));

    // the cheap structural guard ran before the collection guard
    let dirty = Value::list(vec![Value::Null]);
    match scope.set("x", dirty) {
        Err(SetError::Violation(violation)) => {
            assert_eq!(violation.guard, "not-null-elements")
        }
        other => panic!("expected violation, got {other:?}"),
    }
}

#[test]
fn child_scope_fallthrough_with_parent_listener() {
    // C has no y; C.lookup falls through to S; C.set("y")
    // writes S's binding and S's listener fires exactly once
    let parent = Scope::root("S");
    parent
        .declare("y", Value::Int(1), GuardChain::empty(), VarFlags::default())
        .unwrap();
    let child = parent.push_child("C");

    let signals = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&signals);
    parent.add_listener("y", move |signal: &Signal| {
        sink.lock().push(signal.clone());
    });

    assert_eq!(child.lookup(&"y".into()), Some(Value::Int(1)));
    child.set("y", Value::Int(2)).unwrap();

    let recorded = signals.lock();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].old, Some(Value::Int(1)));
    assert_eq!(recorded[0].new, Value::Int(2));
    assert_eq!(recorded[0].scope, parent.id());
}

#[test]
fn listener_collaborators_share_the_registration_path() {
    // the type learner and state tracer are ordinary listeners; both see
    // every signal, neither affects the write path
    crate::init_tracing();
    let scope = Scope::root("main");
    scope
        .declare("v", Value::Int(0), GuardChain::empty(), VarFlags::default())
        .unwrap();

    let learner = TypeLearner::new();
    let tracer = StateTracer::new();
    learner.attach(&scope, "v");
    tracer.attach(&scope, "v");

    scope.set("v", Value::Int(1)).unwrap();
    scope.set("v", Value::Decimal(2.5)).unwrap();
    scope.set("v", Value::Int(3)).unwrap();

    assert_eq!(tracer.traced(), 3);
    let prediction = learner.predict(&"v".into());
    assert_eq!(prediction.observations(), 3);
    assert_eq!(prediction.probable_kind(), Some(ValueKind::Int));
}

#[test]
fn module_mounting_through_resolver() {
    let module = Scope::root("strings");
    module
        .declare(
            "sep",
            Value::text(", "),
            GuardChain::empty(),
            VarFlags::default().read_only(),
        )
        .unwrap();

    let resolver = StaticResolver::new();
    resolver.register("lib/strings", module);

    let scope = Scope::root("main");
    mount_module(&scope, &resolver, "strings", "lib/strings").unwrap();

    assert_eq!(
        scope.lookup(&VarKey::parse("strings::sep")),
        Some(Value::text(", "))
    );
    // mounted bindings keep their own flags
    assert!(matches!(
        scope.set(VarKey::parse("strings::sep"), Value::text(";")),
        Err(SetError::ReadOnly(_))
    ));
}

#[test]
fn reentrant_listener_writes_are_rejected_not_cyclic() {
    let scope = Scope::root("main");
    scope
        .declare("x", Value::Int(0), GuardChain::empty(), VarFlags::default())
        .unwrap();

    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&results);
    let reentrant_scope = scope.clone();
    scope.add_listener("x", move |_signal: &Signal| {
        sink.lock()
            .push(reentrant_scope.set("x", Value::Int(999)));
    });

    scope.set("x", Value::Int(1)).unwrap();
    scope.set("x", Value::Int(2)).unwrap();

    let recorded = results.lock();
    assert_eq!(recorded.len(), 2);
    assert!(recorded
        .iter()
        .all(|r| matches!(r, Err(SetError::Reentrant(_)))));
    assert_eq!(scope.lookup(&"x".into()), Some(Value::Int(2)));
}
