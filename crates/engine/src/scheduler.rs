//! Timed execution
//!
//! One coordinating timer thread owns a min-heap of due entries and hands
//! expired work to the executor pool - the timer thread itself never runs an
//! operation. Three entry kinds share the heap: one-shot schedules,
//! repeating schedules, and deadline watches that fail a future with a
//! timeout once its time is up.
//!
//! Repeating schedules never overlap themselves: a tick that comes due while
//! the previous invocation is still running is skipped, not queued, so a
//! slow operation cannot build an unbounded backlog. Each tick's context
//! carries the tick index.

use crate::executor::Executor;
use parking_lot::{Condvar, Mutex};
use rill_core::{ErrorKind, ErrorValue, FutureValue, Operation, Value};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::debug;

/// Cancellable control over a repeating schedule
///
/// After [`cancel`](Self::cancel) no further invocations occur; an
/// invocation already in flight runs to completion.
#[derive(Debug, Clone)]
pub struct RepeatHandle {
    cancelled: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
    in_flight: Arc<AtomicBool>,
}

impl RepeatHandle {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            ticks: Arc::new(AtomicU64::new(0)),
            skipped: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop future ticks. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// True once cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Invocations actually started
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Ticks skipped because the prior invocation was still running
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Acquire)
    }
}

enum TimerJob {
    Once {
        op: Arc<dyn Operation>,
        inputs: Vec<Value>,
        future: FutureValue,
    },
    Repeat {
        op: Arc<dyn Operation>,
        inputs: Vec<Value>,
        period: Duration,
        handle: RepeatHandle,
    },
    Deadline {
        future: FutureValue,
    },
}

struct TimerEntry {
    due: Instant,
    seq: u64,
    job: TimerJob,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

// Earliest due first, then insertion order (BinaryHeap is a max-heap)
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then(other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

struct SchedulerInner {
    heap: Mutex<BinaryHeap<TimerEntry>>,
    timer_changed: Condvar,
    shutdown: AtomicBool,
    seq: AtomicU64,
}

/// Single coordinating timer source feeding the executor pool
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
    executor: Arc<Executor>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Start the timer thread (named `rill-timer`) over `executor`
    pub fn new(executor: Arc<Executor>) -> Self {
        let inner = Arc::new(SchedulerInner {
            heap: Mutex::new(BinaryHeap::new()),
            timer_changed: Condvar::new(),
            shutdown: AtomicBool::new(false),
            seq: AtomicU64::new(0),
        });

        let loop_inner = Arc::clone(&inner);
        let loop_executor = Arc::clone(&executor);
        let timer = std::thread::Builder::new()
            .name("rill-timer".to_string())
            .spawn(move || timer_loop(&loop_inner, &loop_executor))
            .expect("failed to spawn scheduler timer thread");

        Self {
            inner,
            executor,
            timer: Mutex::new(Some(timer)),
        }
    }

    fn push(&self, due: Instant, job: TimerJob) {
        {
            let mut heap = self.inner.heap.lock();
            heap.push(TimerEntry {
                due,
                seq: self.inner.seq.fetch_add(1, Ordering::Relaxed),
                job,
            });
        }
        self.inner.timer_changed.notify_all();
    }

    /// Run `op` once after `delay`
    ///
    /// Cancelling the returned future before the timer fires prevents the
    /// invocation entirely.
    pub fn schedule_once(
        &self,
        op: Arc<dyn Operation>,
        inputs: Vec<Value>,
        delay: Duration,
    ) -> FutureValue {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return FutureValue::cancelled();
        }
        let future = FutureValue::new();
        self.push(
            Instant::now() + delay,
            TimerJob::Once {
                op,
                inputs,
                future: future.clone(),
            },
        );
        future
    }

    /// Run `op` every `period`, skipping ticks that would overlap a still
    /// running invocation
    pub fn schedule_repeating(
        &self,
        op: Arc<dyn Operation>,
        inputs: Vec<Value>,
        period: Duration,
    ) -> RepeatHandle {
        let handle = RepeatHandle::new();
        if self.inner.shutdown.load(Ordering::Acquire) {
            handle.cancel();
            return handle;
        }
        self.push(
            Instant::now() + period,
            TimerJob::Repeat {
                op,
                inputs,
                period,
                handle: handle.clone(),
            },
        );
        handle
    }

    /// Fail `future` with a timeout unless it settles within `timeout`
    ///
    /// Also arms the future's cancellation token deadline, so the operation
    /// observes expiry through the same token it polls for cancellation.
    pub fn enforce_deadline(&self, future: &FutureValue, timeout: Duration) {
        future.set_deadline(timeout);
        if self.inner.shutdown.load(Ordering::Acquire) {
            return;
        }
        self.push(
            Instant::now() + timeout,
            TimerJob::Deadline {
                future: future.clone(),
            },
        );
    }

    /// Stop the timer source
    ///
    /// Outstanding one-shot futures settle `Cancelled`; repeating schedules
    /// stop ticking. Executor shutdown is the owner's separate call.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        let drained: Vec<TimerEntry> = {
            let mut heap = self.inner.heap.lock();
            self.inner.timer_changed.notify_all();
            heap.drain().collect()
        };
        for entry in drained {
            match entry.job {
                TimerJob::Once { future, .. } => {
                    let _ = future.cancel();
                }
                TimerJob::Repeat { handle, .. } => handle.cancel(),
                TimerJob::Deadline { .. } => {}
            }
        }
        if let Some(timer) = self.timer.lock().take() {
            let _ = timer.join();
        }
    }
}

fn timer_loop(inner: &SchedulerInner, executor: &Arc<Executor>) {
    let mut heap = inner.heap.lock();
    loop {
        if inner.shutdown.load(Ordering::Acquire) {
            return;
        }
        let next_due = heap.peek().map(|entry| entry.due);
        match next_due {
            None => {
                inner.timer_changed.wait(&mut heap);
            }
            Some(due) if due > Instant::now() => {
                let _ = inner.timer_changed.wait_until(&mut heap, due);
            }
            Some(_) => {
                if let Some(entry) = heap.pop() {
                    // fire outside the heap lock; re-arming relocks below
                    drop(heap);
                    let rearmed = fire(entry, inner, executor);
                    heap = inner.heap.lock();
                    if let Some(rearmed) = rearmed {
                        heap.push(rearmed);
                    }
                }
            }
        }
    }
}

/// Dispatch one expired entry; returns the re-armed entry for repeats
fn fire(
    entry: TimerEntry,
    inner: &SchedulerInner,
    executor: &Arc<Executor>,
) -> Option<TimerEntry> {
    match entry.job {
        TimerJob::Once { op, inputs, future } => {
            // cancelled before the timer fired: skip the invocation
            if !future.is_settled() {
                executor.submit_prepared(op, inputs, future, 0);
            }
            None
        }
        TimerJob::Deadline { future } => {
            if future.fail(ErrorValue::new(ErrorKind::Timeout, "deadline expired"))
                == rill_core::SettleOutcome::Settled
            {
                future.token().cancel();
                debug!("deadline expired, future failed with timeout");
            }
            None
        }
        TimerJob::Repeat {
            op,
            inputs,
            period,
            handle,
        } => {
            if handle.is_cancelled() {
                return None;
            }
            if handle.in_flight.swap(true, Ordering::AcqRel) {
                // prior invocation still running: skip, never queue overlap
                handle.skipped.fetch_add(1, Ordering::Release);
            } else {
                let tick = handle.ticks.fetch_add(1, Ordering::AcqRel);
                let future = FutureValue::new();
                let in_flight = Arc::clone(&handle.in_flight);
                future.on_settled(move |_| {
                    in_flight.store(false, Ordering::Release);
                });
                executor.submit_prepared(Arc::clone(&op), inputs.clone(), future, tick);
            }
            Some(TimerEntry {
                due: entry.due + period,
                seq: inner.seq.fetch_add(1, Ordering::Relaxed),
                job: TimerJob::Repeat {
                    op,
                    inputs,
                    period,
                    handle,
                },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutorConfig;
    use rill_core::{FnOperation, FutureState, Invoked, Settled};

    fn engine() -> (Arc<Executor>, Scheduler) {
        let executor = Arc::new(Executor::new(ExecutorConfig::default().workers(2)));
        let scheduler = Scheduler::new(Arc::clone(&executor));
        (executor, scheduler)
    }

    fn teardown(executor: Arc<Executor>, scheduler: Scheduler) {
        scheduler.shutdown();
        executor.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_schedule_once_fires_after_delay() {
        let (executor, scheduler) = engine();
        let op: Arc<dyn Operation> =
            Arc::new(FnOperation::ready("now", |_| Value::text("fired")));

        let started = Instant::now();
        let future = scheduler.schedule_once(op, vec![], Duration::from_millis(30));
        assert_eq!(future.state(), FutureState::Pending);

        let settled = future.wait_timeout(Duration::from_secs(2));
        assert_eq!(settled, Some(Settled::Resolved(Value::text("fired"))));
        assert!(started.elapsed() >= Duration::from_millis(30));
        teardown(executor, scheduler);
    }

    #[test]
    fn test_cancel_before_fire_prevents_invocation() {
        let (executor, scheduler) = engine();
        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        let op: Arc<dyn Operation> = Arc::new(FnOperation::ready("never", move |_| {
            r.store(true, Ordering::SeqCst);
            Value::Void
        }));

        let future = scheduler.schedule_once(op, vec![], Duration::from_millis(60));
        future.cancel();
        std::thread::sleep(Duration::from_millis(150));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(future.state(), FutureState::Cancelled);
        teardown(executor, scheduler);
    }

    #[test]
    fn test_repeating_ticks_and_cancel() {
        let (executor, scheduler) = engine();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let op: Arc<dyn Operation> = Arc::new(FnOperation::new("tick", move |_i, cx| {
            c.fetch_add(1, Ordering::SeqCst);
            Invoked::Ready(Value::Int(cx.tick as i64))
        }));

        let handle = scheduler.schedule_repeating(op, vec![], Duration::from_millis(20));
        while handle.ticks() < 3 {
            std::thread::sleep(Duration::from_millis(10));
        }
        handle.cancel();
        let after_cancel = count.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(100));
        // at most one in-flight invocation finished after cancel, none started
        assert!(count.load(Ordering::SeqCst) <= after_cancel + 1);
        teardown(executor, scheduler);
    }

    #[test]
    fn test_overlapping_ticks_skip_not_queue() {
        let (executor, scheduler) = engine();
        let concurrent = Arc::new(AtomicU64::new(0));
        let peak = Arc::new(AtomicU64::new(0));
        let runs = Arc::new(AtomicU64::new(0));
        let (c, p, r) = (
            Arc::clone(&concurrent),
            Arc::clone(&peak),
            Arc::clone(&runs),
        );
        // runtime (75ms) far exceeds the period (15ms)
        let op: Arc<dyn Operation> = Arc::new(FnOperation::ready("slow", move |_| {
            let now = c.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(75));
            c.fetch_sub(1, Ordering::SeqCst);
            r.fetch_add(1, Ordering::SeqCst);
            Value::Void
        }));

        let handle = scheduler.schedule_repeating(op, vec![], Duration::from_millis(15));
        std::thread::sleep(Duration::from_millis(400));
        handle.cancel();
        std::thread::sleep(Duration::from_millis(120));

        assert_eq!(peak.load(Ordering::SeqCst), 1, "overlapping invocations ran");
        assert!(handle.skipped() > 0, "slow ticks should have been skipped");
        assert!(runs.load(Ordering::SeqCst) >= 2);
        teardown(executor, scheduler);
    }

    #[test]
    fn test_tick_index_reaches_operation() {
        let (executor, scheduler) = engine();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let op: Arc<dyn Operation> = Arc::new(FnOperation::new("ticked", move |_i, cx| {
            s.lock().push(cx.tick);
            Invoked::Ready(Value::Void)
        }));

        let handle = scheduler.schedule_repeating(op, vec![], Duration::from_millis(15));
        while handle.ticks() < 3 {
            std::thread::sleep(Duration::from_millis(10));
        }
        handle.cancel();
        std::thread::sleep(Duration::from_millis(60));

        let seen = seen.lock().clone();
        assert!(seen.len() >= 3);
        assert_eq!(&seen[..3], &[0, 1, 2]);
        teardown(executor, scheduler);
    }

    #[test]
    fn test_deadline_fails_future_and_trips_token() {
        let (executor, scheduler) = engine();
        let observed = Arc::new(AtomicBool::new(false));
        let o = Arc::clone(&observed);
        let op: Arc<dyn Operation> = Arc::new(FnOperation::new("stuck", move |_i, cx| {
            let started = Instant::now();
            while !cx.is_cancelled() && started.elapsed() < Duration::from_secs(5) {
                std::thread::sleep(Duration::from_millis(5));
            }
            o.store(cx.is_cancelled(), Ordering::SeqCst);
            Invoked::Ready(Value::Void)
        }));

        let future = executor.submit(op, vec![]);
        scheduler.enforce_deadline(&future, Duration::from_millis(50));

        let settled = future.wait_timeout(Duration::from_secs(2));
        match settled {
            Some(Settled::Failed(e)) => assert_eq!(e.kind, ErrorKind::Timeout),
            other => panic!("expected timeout failure, got {other:?}"),
        }
        // the operation sees expiry through its own token
        executor.drain();
        assert!(observed.load(Ordering::SeqCst));
        teardown(executor, scheduler);
    }

    #[test]
    fn test_deadline_noop_when_already_settled() {
        let (executor, scheduler) = engine();
        let op: Arc<dyn Operation> = Arc::new(FnOperation::ready("fast", |_| Value::Int(1)));
        let future = executor.submit(op, vec![]);
        future.wait_timeout(Duration::from_secs(2)).unwrap();

        scheduler.enforce_deadline(&future, Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(future.poll(), Some(Settled::Resolved(Value::Int(1))));
        teardown(executor, scheduler);
    }

    #[test]
    fn test_scheduler_shutdown_cancels_outstanding() {
        let (executor, scheduler) = engine();
        let op: Arc<dyn Operation> = Arc::new(FnOperation::ready("later", |_| Value::Void));
        let future = scheduler.schedule_once(op.clone(), vec![], Duration::from_secs(60));
        let handle = scheduler.schedule_repeating(op, vec![], Duration::from_secs(60));

        scheduler.shutdown();
        assert_eq!(future.state(), FutureState::Cancelled);
        assert!(handle.is_cancelled());
        executor.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_two_schedules_fire_in_due_order() {
        let (executor, scheduler) = engine();
        let order = Arc::new(Mutex::new(Vec::new()));
        let make = |tag: &'static str, order: &Arc<Mutex<Vec<&'static str>>>| {
            let order = Arc::clone(order);
            let op: Arc<dyn Operation> = Arc::new(FnOperation::ready(tag, move |_| {
                order.lock().push(tag);
                Value::Void
            }));
            op
        };

        let late = scheduler.schedule_once(make("late", &order), vec![], Duration::from_millis(80));
        let soon = scheduler.schedule_once(make("soon", &order), vec![], Duration::from_millis(20));

        soon.wait_timeout(Duration::from_secs(2)).unwrap();
        late.wait_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(*order.lock(), vec!["soon", "late"]);
        teardown(executor, scheduler);
    }
}
