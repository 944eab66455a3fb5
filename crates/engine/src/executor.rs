//! Bounded worker pool executing operations
//!
//! A fixed pool of named worker threads pulls submitted operations off a
//! FIFO queue and settles each operation's future. `submit` never blocks the
//! caller: backpressure and shutdown surface as already-settled futures.
//!
//! An operation returning a deferred result does not occupy a worker while
//! it waits - the outer future is chained to the inner one through a
//! continuation and the worker moves on.
//!
//! A panicking operation settles its future `Failed` with an operation-panic
//! fault and the pool survives.

use crate::config::ExecutorConfig;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use rill_core::{
    ErrorKind, ErrorValue, Fault, FutureValue, Invoked, OpContext, Operation, Settled, Value,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::error;

/// Executor metrics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Operations waiting in the queue
    pub queue_depth: usize,
    /// Operations currently on a worker
    pub active: usize,
    /// Operations executed since creation (including panicked and skipped)
    pub completed: u64,
    /// Worker thread count
    pub workers: usize,
}

struct Job {
    op: Arc<dyn Operation>,
    inputs: Vec<Value>,
    future: FutureValue,
    tick: u64,
}

struct ExecutorInner {
    queue: Mutex<VecDeque<Job>>,
    work_ready: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    queue_depth: AtomicUsize,
    active: AtomicUsize,
    completed: AtomicU64,
    max_queue_depth: usize,
    /// Futures of operations currently on a worker, so shutdown can cancel
    /// them (tripping their tokens) once the grace period is spent
    inflight: Mutex<FxHashMap<u64, FutureValue>>,
    job_seq: AtomicU64,
}

/// Fixed worker pool turning operations into settled futures
///
/// Workers are named `rill-worker-0`, `rill-worker-1`, etc.
pub struct Executor {
    inner: Arc<ExecutorInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    num_threads: usize,
}

impl Executor {
    /// Start a pool per `config`
    pub fn new(config: ExecutorConfig) -> Self {
        let inner = Arc::new(ExecutorInner {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            queue_depth: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            max_queue_depth: config.max_queue_depth,
            inflight: Mutex::new(FxHashMap::default()),
            job_seq: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(config.workers);
        for i in 0..config.workers {
            let inner_clone = Arc::clone(&inner);
            let handle = std::thread::Builder::new()
                .name(format!("rill-worker-{}", i))
                .spawn(move || worker_loop(&inner_clone))
                .expect("failed to spawn executor worker thread");
            workers.push(handle);
        }

        Self {
            inner,
            workers: Mutex::new(workers),
            num_threads: config.workers,
        }
    }

    /// Run `op` on the pool, immediately and without blocking the caller
    ///
    /// After shutdown the returned future is already `Cancelled`; when the
    /// queue is at capacity it is already `Failed`.
    pub fn submit(&self, op: Arc<dyn Operation>, inputs: Vec<Value>) -> FutureValue {
        let future = FutureValue::new();
        self.submit_prepared(op, inputs, future.clone(), 0);
        future
    }

    /// Queue `op` against an already-created future (scheduler entry point)
    pub(crate) fn submit_prepared(
        &self,
        op: Arc<dyn Operation>,
        inputs: Vec<Value>,
        future: FutureValue,
        tick: u64,
    ) {
        if self.inner.shutdown.load(Ordering::Acquire) {
            let _ = future.cancel();
            return;
        }
        if self.inner.queue_depth.load(Ordering::Acquire) >= self.inner.max_queue_depth {
            let _ = future.fail(ErrorValue::new(
                ErrorKind::Internal,
                "executor queue is full",
            ));
            return;
        }

        {
            let mut queue = self.inner.queue.lock();
            queue.push_back(Job {
                op,
                inputs,
                future,
                tick,
            });
            self.inner.queue_depth.fetch_add(1, Ordering::Release);
        }
        self.inner.work_ready.notify_one();
    }

    /// Block until all queued and in-flight operations have completed
    ///
    /// Workers keep running afterwards; this is not shutdown.
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while self.inner.queue_depth.load(Ordering::Acquire) > 0
            || self.inner.active.load(Ordering::Acquire) > 0
        {
            self.inner.drain_cond.wait(&mut queue);
        }
    }

    /// Stop intake, drain in-flight work up to `grace`, cancel the rest
    ///
    /// Queued operations that did not start within the grace period settle
    /// `Cancelled`. Idempotent. Worker threads are joined; an operation that
    /// ignores its cancellation token delays the join by however long it
    /// keeps running.
    pub fn shutdown(&self, grace: std::time::Duration) {
        self.inner.shutdown.store(true, Ordering::Release);

        // Lock the queue before notifying to prevent lost-wakeup: a worker
        // between its shutdown check and condvar wait holds this lock, so
        // acquiring it guarantees the worker either is already in wait()
        // (and our notify will wake it) or will re-check shutdown.
        let deadline = Instant::now() + grace;
        {
            let mut queue = self.inner.queue.lock();
            self.inner.work_ready.notify_all();

            while self.inner.queue_depth.load(Ordering::Acquire) > 0
                || self.inner.active.load(Ordering::Acquire) > 0
            {
                if self
                    .inner
                    .drain_cond
                    .wait_until(&mut queue, deadline)
                    .timed_out()
                {
                    break;
                }
            }

            // grace exhausted (or already idle): cancel whatever never started
            for job in queue.drain(..) {
                self.inner.queue_depth.fetch_sub(1, Ordering::Release);
                self.inner.completed.fetch_add(1, Ordering::Relaxed);
                let _ = job.future.cancel();
            }
            self.inner.work_ready.notify_all();
        }

        // cancel whatever is still on a worker; this trips the tokens the
        // operations are polling, so cooperative work unblocks the join below
        for (_, future) in self.inner.inflight.lock().iter() {
            let _ = future.cancel();
        }

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// Metrics snapshot
    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            queue_depth: self.inner.queue_depth.load(Ordering::Relaxed),
            active: self.inner.active.load(Ordering::Relaxed),
            completed: self.inner.completed.load(Ordering::Relaxed),
            workers: self.num_threads,
        }
    }
}

/// RAII guard that decrements `active` and notifies drain waiters on drop,
/// so bookkeeping stays correct even when an operation panics.
struct ActiveJobGuard<'a> {
    inner: &'a ExecutorInner,
}

impl<'a> Drop for ActiveJobGuard<'a> {
    fn drop(&mut self) {
        let prev_active = self.inner.active.fetch_sub(1, Ordering::Release);
        self.inner.completed.fetch_add(1, Ordering::Relaxed);

        // Lock the queue before notifying to prevent lost-wakeup against
        // drain()/shutdown() checking the condition under this lock.
        if prev_active == 1 && self.inner.queue_depth.load(Ordering::Acquire) == 0 {
            let _queue = self.inner.queue.lock();
            self.inner.drain_cond.notify_all();
        }
    }
}

fn worker_loop(inner: &ExecutorInner) {
    loop {
        let job = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    inner.queue_depth.fetch_sub(1, Ordering::Release);
                    inner.active.fetch_add(1, Ordering::Release);
                    break job;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let _guard = ActiveJobGuard { inner };
        let job_id = inner.job_seq.fetch_add(1, Ordering::Relaxed);
        inner.inflight.lock().insert(job_id, job.future.clone());
        run_job(job);
        inner.inflight.lock().remove(&job_id);
        // _guard drops here → decrements active, notifies drain waiters
    }
}

fn run_job(job: Job) {
    // a future cancelled while queued is not worth running
    if job.future.is_settled() {
        return;
    }
    let cx = OpContext::with_tick(job.future.token().clone(), job.tick);

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        job.op.invoke(&job.inputs, &cx)
    }));

    match outcome {
        Ok(Invoked::Ready(value)) => {
            let _ = job.future.resolve(value);
        }
        Ok(Invoked::Deferred(inner_future)) => {
            // chain instead of blocking the worker on the inner settlement
            let outer = job.future;
            inner_future.on_settled(move |settled: &Settled| {
                let _ = outer.settle(settled.clone());
            });
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "(non-string panic)".to_string());
            let fault = Fault::OperationPanic { message };
            error!(operation = job.op.name(), %fault, "operation panicked");
            let _ = job.future.fail(fault.as_error_value());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_core::{FnOperation, FutureState};
    use std::time::Duration;

    fn add_op() -> Arc<dyn Operation> {
        Arc::new(FnOperation::ready("add", |inputs| {
            inputs.iter().fold(Value::Int(0), |acc, v| &acc + v)
        }))
    }

    fn small_executor() -> Executor {
        Executor::new(ExecutorConfig::default().workers(2))
    }

    #[test]
    fn test_submit_resolves_without_blocking_caller() {
        let executor = small_executor();
        let before = Instant::now();
        let future = executor.submit(add_op(), vec![Value::Int(2), Value::Int(3)]);
        // submit hands the job to the pool and returns immediately
        assert!(before.elapsed() < Duration::from_millis(50));

        assert_eq!(
            future.wait_timeout(Duration::from_secs(2)),
            Some(Settled::Resolved(Value::Int(5)))
        );
        executor.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_error_value_resolves_not_fails() {
        let executor = small_executor();
        let op: Arc<dyn Operation> = Arc::new(FnOperation::ready("boom", |_| {
            Value::error(ErrorKind::Business, "no stock")
        }));
        let settled = executor.submit(op, vec![]).wait_timeout(Duration::from_secs(2));
        match settled {
            Some(Settled::Resolved(v)) => {
                assert_eq!(v.as_error().map(|e| e.kind), Some(ErrorKind::Business));
            }
            other => panic!("expected resolved error value, got {other:?}"),
        }
        executor.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_panic_isolated_as_failed_future() {
        let executor = small_executor();
        let op: Arc<dyn Operation> = Arc::new(FnOperation::ready("panics", |_| {
            panic!("intentional test panic");
        }));
        let settled = executor.submit(op, vec![]).wait_timeout(Duration::from_secs(2));
        match settled {
            Some(Settled::Failed(e)) => {
                assert_eq!(e.kind, ErrorKind::Internal);
                assert!(e.message.contains("intentional test panic"));
            }
            other => panic!("expected failure, got {other:?}"),
        }

        // the pool survives and keeps executing
        let future = executor.submit(add_op(), vec![Value::Int(1), Value::Int(1)]);
        assert_eq!(
            future.wait_timeout(Duration::from_secs(2)),
            Some(Settled::Resolved(Value::Int(2)))
        );
        executor.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_deferred_result_chains() {
        let executor = small_executor();
        let inner = FutureValue::new();
        let handle = inner.clone();
        let op: Arc<dyn Operation> = Arc::new(FnOperation::new("defer", move |_i, _cx| {
            Invoked::Deferred(handle.clone())
        }));

        let outer = executor.submit(op, vec![]);
        executor.drain();
        // the worker is free while the inner future is pending
        assert_eq!(outer.state(), FutureState::Pending);
        assert_eq!(executor.stats().active, 0);

        inner.resolve(Value::Int(11));
        assert_eq!(
            outer.wait_timeout(Duration::from_secs(2)),
            Some(Settled::Resolved(Value::Int(11)))
        );
        executor.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_cancelled_future_skips_queued_job() {
        // a single blocked worker forces the second job to sit in the queue
        let executor = Executor::new(ExecutorConfig::default().workers(1));
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let g = Arc::clone(&gate);
        let blocker: Arc<dyn Operation> = Arc::new(FnOperation::ready("block", move |_| {
            let (lock, cond) = &*g;
            let mut open = lock.lock();
            while !*open {
                cond.wait(&mut open);
            }
            Value::Void
        }));
        let blocked = executor.submit(blocker, vec![]);

        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        let observed: Arc<dyn Operation> = Arc::new(FnOperation::ready("observed", move |_| {
            r.store(true, Ordering::SeqCst);
            Value::Void
        }));
        let queued = executor.submit(observed, vec![]);
        assert_eq!(queued.cancel(), rill_core::SettleOutcome::Settled);

        // release the worker; the cancelled job must be skipped
        {
            let (lock, cond) = &*gate;
            *lock.lock() = true;
            cond.notify_all();
        }
        blocked.wait_timeout(Duration::from_secs(2)).unwrap();
        executor.drain();
        assert!(!ran.load(Ordering::SeqCst));
        executor.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_backpressure_fails_fast() {
        let executor = Executor::new(ExecutorConfig::default().workers(1).max_queue_depth(1));
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let g = Arc::clone(&gate);
        let blocker: Arc<dyn Operation> = Arc::new(FnOperation::ready("block", move |_| {
            let (lock, cond) = &*g;
            let mut open = lock.lock();
            while !*open {
                cond.wait(&mut open);
            }
            Value::Void
        }));
        let first = executor.submit(blocker, vec![]);
        // wait until the worker picked the job up
        while executor.stats().active == 0 {
            std::thread::sleep(Duration::from_millis(5));
        }

        let _queued = executor.submit(add_op(), vec![Value::Int(1), Value::Int(1)]);
        let rejected = executor.submit(add_op(), vec![Value::Int(1), Value::Int(1)]);
        match rejected.poll() {
            Some(Settled::Failed(e)) => assert!(e.message.contains("queue is full")),
            other => panic!("expected immediate failure, got {other:?}"),
        }

        {
            let (lock, cond) = &*gate;
            *lock.lock() = true;
            cond.notify_all();
        }
        first.wait_timeout(Duration::from_secs(2)).unwrap();
        executor.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_submit_after_shutdown_is_cancelled() {
        let executor = small_executor();
        executor.shutdown(Duration::from_millis(100));
        let future = executor.submit(add_op(), vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(future.state(), FutureState::Cancelled);
    }

    #[test]
    fn test_shutdown_grace_cancels_queued_and_inflight() {
        let executor = Executor::new(ExecutorConfig::default().workers(1));
        let observed = Arc::new(AtomicBool::new(false));
        let o = Arc::clone(&observed);
        // cooperative: runs until its token trips (bounded for test safety)
        let slow: Arc<dyn Operation> = Arc::new(FnOperation::new("slow", move |_i, cx| {
            let started = Instant::now();
            while !cx.is_cancelled() && started.elapsed() < Duration::from_secs(5) {
                std::thread::sleep(Duration::from_millis(5));
            }
            o.store(cx.is_cancelled(), Ordering::SeqCst);
            Invoked::Ready(Value::Void)
        }));
        let inflight = executor.submit(Arc::clone(&slow), vec![]);
        let queued = executor.submit(slow, vec![]);
        while executor.stats().active == 0 {
            std::thread::sleep(Duration::from_millis(5));
        }

        // the in-flight op outlives the grace period, so shutdown cancels
        // both futures; cancelling the in-flight one trips its token
        executor.shutdown(Duration::from_millis(50));

        assert_eq!(inflight.state(), FutureState::Cancelled);
        assert_eq!(queued.state(), FutureState::Cancelled);
        assert!(observed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stats_and_drain() {
        let executor = small_executor();
        for i in 0..10 {
            executor.submit(add_op(), vec![Value::Int(i), Value::Int(1)]);
        }
        executor.drain();
        let stats = executor.stats();
        assert_eq!(stats.completed, 10);
        assert_eq!(stats.queue_depth, 0);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.workers, 2);
        executor.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let executor = small_executor();
        executor.submit(add_op(), vec![Value::Int(1), Value::Int(1)]);
        executor.shutdown(Duration::from_secs(1));
        executor.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_randomized_submit_storm() {
        use rand::Rng;
        let executor = Arc::new(Executor::new(ExecutorConfig::default().workers(4)));
        let mut rng = rand::thread_rng();

        let mut expected = Vec::new();
        let mut futures = Vec::new();
        for _ in 0..200 {
            let a: i64 = rng.gen_range(-1_000..1_000);
            let b: i64 = rng.gen_range(-1_000..1_000);
            expected.push(a + b);
            futures.push(executor.submit(add_op(), vec![Value::Int(a), Value::Int(b)]));
        }
        for (future, sum) in futures.into_iter().zip(expected) {
            assert_eq!(
                future.wait_timeout(Duration::from_secs(5)),
                Some(Settled::Resolved(Value::Int(sum)))
            );
        }
        executor.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_concurrent_submits() {
        let executor = Arc::new(small_executor());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let executor = Arc::clone(&executor);
            handles.push(std::thread::spawn(move || {
                let mut futures = Vec::new();
                for i in 0..50 {
                    futures.push(executor.submit(add_op(), vec![Value::Int(i), Value::Int(i)]));
                }
                for (i, future) in futures.into_iter().enumerate() {
                    assert_eq!(
                        future.wait_timeout(Duration::from_secs(5)),
                        Some(Settled::Resolved(Value::Int(2 * i as i64)))
                    );
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        executor.shutdown(Duration::from_secs(1));
    }
}
