//! Executor, scheduler, pipeline, and resource behavior through the facade

use parking_lot::Mutex;
use rill::{
    ErrorKind, ExecutorConfig, FnOperation, FutureState, Invoked, OpContext, Operation, Pipeline,
    Runtime, Settled, SettleOutcome, Value, ValueUri,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn add_op() -> Arc<dyn Operation> {
    Arc::new(FnOperation::ready("add", |inputs: &[Value]| {
        inputs.iter().fold(Value::Int(0), |acc, v| &acc + v)
    }))
}

#[test]
fn submit_add_resolves_without_blocking() {
    // add(2, 3) resolves to int 5, submit never blocks
    let runtime = Runtime::with_defaults();
    let before = Instant::now();
    let future = runtime.submit(add_op(), vec![Value::Int(2), Value::Int(3)]);
    assert!(before.elapsed() < Duration::from_millis(50));

    assert_eq!(
        future.wait_timeout(Duration::from_secs(2)),
        Some(Settled::Resolved(Value::Int(5)))
    );
    runtime.shutdown(Duration::from_secs(1));
}

#[test]
fn future_settles_exactly_once() {
    let runtime = Runtime::with_defaults();
    let future = runtime.submit(add_op(), vec![Value::Int(1), Value::Int(1)]);
    future.wait_timeout(Duration::from_secs(2)).unwrap();

    // every later transition reports "already settled" and changes nothing
    assert_eq!(future.resolve(Value::Int(9)), SettleOutcome::AlreadySettled);
    assert_eq!(future.cancel(), SettleOutcome::AlreadySettled);
    assert_eq!(
        future.poll(),
        Some(Settled::Resolved(Value::Int(2)))
    );
    runtime.shutdown(Duration::from_secs(1));
}

#[test]
fn cancellation_settles_before_cooperative_observation() {
    // cancelling a future whose operation has not observed the token yet
    // still settles it immediately; the operation stops at its next poll
    let runtime = Runtime::with_defaults();
    let observed = Arc::new(Mutex::new(false));
    let o = Arc::clone(&observed);
    let op: Arc<dyn Operation> = Arc::new(FnOperation::new("poller", move |_i, cx: &OpContext| {
        let started = Instant::now();
        while !cx.is_cancelled() && started.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(5));
        }
        *o.lock() = cx.is_cancelled();
        Invoked::Ready(Value::Void)
    }));

    let future = runtime.submit(op, vec![]);
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(future.cancel(), SettleOutcome::Settled);
    assert_eq!(future.state(), FutureState::Cancelled);

    runtime.executor().drain();
    assert!(*observed.lock());
    runtime.shutdown(Duration::from_secs(1));
}

#[test]
fn repeating_schedule_skips_overlapping_ticks() {
    // runtime > period must produce zero overlap, only skipped ticks
    let runtime = Runtime::with_defaults();
    let concurrent = Arc::new(AtomicU64::new(0));
    let peak = Arc::new(AtomicU64::new(0));
    let (c, p) = (Arc::clone(&concurrent), Arc::clone(&peak));
    let op: Arc<dyn Operation> = Arc::new(FnOperation::ready("slow", move |_| {
        let now = c.fetch_add(1, Ordering::SeqCst) + 1;
        p.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(60));
        c.fetch_sub(1, Ordering::SeqCst);
        Value::Void
    }));

    let handle = runtime
        .scheduler()
        .schedule_repeating(op, vec![], Duration::from_millis(15));
    std::thread::sleep(Duration::from_millis(300));
    handle.cancel();
    std::thread::sleep(Duration::from_millis(100));

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert!(handle.skipped() > 0);
    assert!(handle.ticks() >= 2);
    runtime.shutdown(Duration::from_secs(1));
}

#[test]
fn pipeline_through_executor_with_deferred_stage() {
    let runtime = Arc::new(Runtime::with_defaults());

    // stage two re-enters the scheduler, so the pipeline suspends rather
    // than occupying a worker while it waits
    let delayed: Arc<dyn Operation> = Arc::new(FnOperation::ready("delayed-inc", |inputs| {
        &inputs[0] + &Value::Int(1)
    }));
    let rt = Arc::clone(&runtime);
    let pipeline = Pipeline::new("staged")
        .then(FnOperation::ready("double", |inputs: &[Value]| {
            &inputs[0] + &inputs[0]
        }))
        .then(FnOperation::new("defer", move |inputs: &[Value], _cx| {
            Invoked::Deferred(rt.scheduler().schedule_once(
                Arc::clone(&delayed),
                inputs.to_vec(),
                Duration::from_millis(20),
            ))
        }));

    let future = runtime.submit(Arc::new(pipeline), vec![Value::Int(10)]);
    assert_eq!(
        future.wait_timeout(Duration::from_secs(2)),
        Some(Settled::Resolved(Value::Int(21)))
    );
    runtime.shutdown(Duration::from_secs(1));
}

#[test]
fn resource_handler_behind_uri_scheme() {
    let runtime = Runtime::with_defaults();
    let uri = ValueUri::new("mem", "inbox");
    let resources = Arc::clone(runtime.resources());

    // an operation performing external I/O resolves its handler by scheme
    let write_uri = uri.clone();
    let write: Arc<dyn Operation> = Arc::new(FnOperation::ready("publish", move |inputs| {
        match resources.resolve(&write_uri) {
            Ok(handler) => match handler.write(inputs[0].clone()) {
                Ok(v) => v,
                Err(e) => Value::from_error(e),
            },
            Err(e) => Value::from_error(e),
        }
    }));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler = runtime.resources().resolve(&uri).unwrap();
    handler.subscribe(Arc::new(move |value: &Value| {
        sink.lock().push(value.clone());
    }));

    runtime
        .submit(write, vec![Value::text("hello")])
        .wait_timeout(Duration::from_secs(2))
        .unwrap();

    assert_eq!(handler.read().unwrap(), Value::text("hello"));
    assert_eq!(*seen.lock(), vec![Value::text("hello")]);

    // unknown schemes surface as resource error values, not faults
    let missing = runtime
        .resources()
        .resolve(&ValueUri::new("ftp", "x"))
        .unwrap_err();
    assert_eq!(missing.kind, ErrorKind::Resource);
    runtime.shutdown(Duration::from_secs(1));
}

#[test]
fn shutdown_grace_bounds_pending_work() {
    let runtime = Runtime::new(ExecutorConfig::default().workers(1));
    let op: Arc<dyn Operation> = Arc::new(FnOperation::new("cooperative", |_i, cx| {
        let started = Instant::now();
        while !cx.is_cancelled() && started.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(5));
        }
        Invoked::Ready(Value::Void)
    }));
    let inflight = runtime.submit(Arc::clone(&op), vec![]);
    let queued = runtime.submit(op, vec![]);

    let before = Instant::now();
    runtime.shutdown(Duration::from_millis(60));
    // bounded: well under the operation's own 5s ceiling
    assert!(before.elapsed() < Duration::from_secs(2));
    assert_eq!(inflight.state(), FutureState::Cancelled);
    assert_eq!(queued.state(), FutureState::Cancelled);
}
