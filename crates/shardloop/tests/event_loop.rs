//! Standalone event loops: backpressure, blocking posts, timers, shutdown

mod common;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use shardloop::prelude::*;
use shardloop::{last_error, ExecutionEvent, FnObserver, RejectReason, TimerHandle};

use common::{wait_until, Semaphore};

fn started_loop(name: &str, capacity: usize, requests_per_iteration: usize) -> EventLoopHandle {
    let event_loop = EventLoop::new().with_name(name);
    let mut handle = EventLoopHandle::new(event_loop, capacity, requests_per_iteration).unwrap();
    handle.start().unwrap();
    handle
}

/// Occupy the loop until `gate` is posted. Returns once the request is
/// running, so the mailbox is empty again.
fn block_loop(handle: &EventLoopHandle, gate: &Arc<Semaphore>) {
    let started = Arc::new(Semaphore::new());
    {
        let (gate, started) = (Arc::clone(gate), Arc::clone(&started));
        handle
            .post_request(request_fn(move |_| {
                started.post();
                gate.wait();
            }))
            .unwrap();
    }
    started.wait();
}

#[test]
fn test_full_mailbox_rejects_then_timer_fires() {
    let handle = started_loop("bounded", 2, 1);
    let loop_thread = handle.thread_id().unwrap();
    let gate = Arc::new(Semaphore::new());
    let sem2 = Arc::new(Semaphore::new());

    block_loop(&handle, &gate);

    for _ in 0..2 {
        let sem2 = Arc::clone(&sem2);
        handle.post_request(request_fn(move |_| sem2.post())).unwrap();
    }
    assert_eq!(handle.queued(), 2);

    let err = handle.post_request(request_fn(|_| panic!("must not run"))).unwrap_err();
    assert_eq!(err.reason(), RejectReason::Full);
    assert_eq!(err.code(), ErrorCode::NoBufs);
    assert_eq!(last_error(), ErrorCode::NoBufs);
    assert_eq!(handle.stats().rejected_full, 1);

    gate.post();
    sem2.wait();
    sem2.wait();

    // A timer armed from inside a request fires on the loop thread
    let timer = Arc::new(Mutex::new(Timer::new()));
    let fired = Arc::new(Semaphore::new());
    {
        let (timer, fired) = (Arc::clone(&timer), Arc::clone(&fired));
        handle
            .blocking_request(request_fn(move |ctx| {
                let fired = Arc::clone(&fired);
                let mut timer = timer.lock().unwrap();
                timer.assign(ctx, move |_| {
                    assert_eq!(thread::current().id(), loop_thread);
                    fired.post();
                });
                timer.activate(ctx, Duration::from_millis(10));
                assert!(timer.is_active(ctx));
            }))
            .unwrap();
    }
    fired.wait();
    assert_eq!(timer.lock().unwrap().owner(), handle.id());
    wait_until(|| handle.stats().timers_fired == 1);
}

#[test]
fn test_blocking_request_waits_for_space() {
    let handle = started_loop("blocking", 1, 1);
    let gate = Arc::new(Semaphore::new());
    block_loop(&handle, &gate);
    handle.post_request(request_fn(|_| {})).unwrap();

    let loop_ref = handle.loop_ref();
    let posted = Arc::new(AtomicBool::new(false));
    let producer = {
        let posted = Arc::clone(&posted);
        thread::spawn(move || {
            let result = loop_ref.blocking_request(request_fn(|_| {}));
            posted.store(true, Ordering::SeqCst);
            result
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!posted.load(Ordering::SeqCst));

    gate.post();
    assert!(producer.join().unwrap().is_ok());
    wait_until(|| handle.stats().executed == 3);
}

#[test]
fn test_blocking_request_fails_on_stop() {
    let mut handle = started_loop("stopping", 1, 1);
    let gate = Arc::new(Semaphore::new());
    block_loop(&handle, &gate);
    handle.post_request(request_fn(|_| {})).unwrap();

    let loop_ref = handle.loop_ref();
    let producer = thread::spawn(move || loop_ref.blocking_request(request_fn(|_| {})));
    thread::sleep(Duration::from_millis(50));

    handle.request_stop();
    let err = producer.join().unwrap().unwrap_err();
    assert_eq!(err.code(), ErrorCode::Shutdown);

    gate.post();
    handle.join();
    let stats = handle.stats();
    assert_eq!(stats.executed, 2);
    assert_eq!(stats.rejected_closed, 1);
}

#[test]
fn test_timer_cancel_before_firing() {
    let handle = started_loop("cancel", 8, 4);
    let timer = Arc::new(Mutex::new(Timer::new()));
    let fired = Arc::new(AtomicUsize::new(0));
    let checked = Arc::new(Semaphore::new());

    {
        let (timer, fired) = (Arc::clone(&timer), Arc::clone(&fired));
        let checked = Arc::clone(&checked);
        handle
            .post_request(request_fn(move |ctx| {
                let fired = Arc::clone(&fired);
                let mut timer = timer.lock().unwrap();
                timer.assign(ctx, move |_| {
                    fired.fetch_add(1, Ordering::SeqCst);
                });
                timer.activate(ctx, Duration::from_millis(20));
                assert!(timer.is_active(ctx));
                assert!(timer.cancel(ctx));
                assert!(!timer.is_active(ctx));
                assert!(!timer.cancel(ctx));
                checked.post();
            }))
            .unwrap();
    }
    checked.wait();

    thread::sleep(Duration::from_millis(80));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(handle.stats().timers_fired, 0);
}

#[test]
fn test_timer_used_from_foreign_loop_panics() {
    let first = started_loop("owner", 4, 1);
    let second = started_loop("intruder", 4, 1);
    let timer = Arc::new(Mutex::new(Timer::new()));
    let done = Arc::new(Semaphore::new());

    {
        let (timer, done) = (Arc::clone(&timer), Arc::clone(&done));
        first
            .post_request(request_fn(move |ctx| {
                timer.lock().unwrap().assign(ctx, |_| {});
                done.post();
            }))
            .unwrap();
    }
    done.wait();

    let panicked = Arc::new(AtomicBool::new(false));
    {
        let (timer, done) = (Arc::clone(&timer), Arc::clone(&done));
        let panicked = Arc::clone(&panicked);
        second
            .post_request(request_fn(move |ctx| {
                let mut timer = timer.lock().unwrap();
                let result = catch_unwind(AssertUnwindSafe(|| {
                    timer.activate(ctx, Duration::from_millis(1));
                }));
                panicked.store(result.is_err(), Ordering::SeqCst);
                done.post();
            }))
            .unwrap();
    }
    done.wait();

    assert!(panicked.load(Ordering::SeqCst));
    assert_eq!(timer.lock().unwrap().owner(), first.id());
}

#[test]
fn test_periodic_timer_cancels_itself() {
    let handle = started_loop("periodic", 4, 1);
    let fires = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(Semaphore::new());
    let slot: Arc<Mutex<Option<TimerHandle>>> = Arc::new(Mutex::new(None));

    {
        let (fires, done) = (Arc::clone(&fires), Arc::clone(&done));
        let slot = Arc::clone(&slot);
        handle
            .post_request(request_fn(move |ctx| {
                let (fires, done) = (Arc::clone(&fires), Arc::clone(&done));
                let inner_slot = Arc::clone(&slot);
                let interval = Duration::from_millis(5);
                let timer = ctx.timers().schedule_periodic(interval, move |ctx| {
                    if fires.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                        let own = inner_slot.lock().unwrap().expect("handle stored before firing");
                        assert!(ctx.timers().cancel(own));
                        done.post();
                    }
                });
                *slot.lock().unwrap() = Some(timer);
            }))
            .unwrap();
    }
    done.wait();

    thread::sleep(Duration::from_millis(50));
    assert_eq!(fires.load(Ordering::SeqCst), 3);
    wait_until(|| handle.stats().timers_fired == 3);
}

/// Counts executions and drops
struct Tracked {
    ran: Arc<AtomicUsize>,
    dropped: Arc<AtomicUsize>,
    outcome: Execution,
}

impl Request for Tracked {
    fn execute(&mut self, _ctx: &mut LoopContext<'_>) -> Execution {
        self.ran.fetch_add(1, Ordering::SeqCst);
        self.outcome
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_never_started_loop_drops_queued_requests() {
    let ran = Arc::new(AtomicUsize::new(0));
    let dropped = Arc::new(AtomicUsize::new(0));

    let handle = EventLoopHandle::new(EventLoop::new(), 4, 1).unwrap();
    for _ in 0..3 {
        let req = Tracked {
            ran: Arc::clone(&ran),
            dropped: Arc::clone(&dropped),
            outcome: Execution::Complete,
        };
        handle.post_request(Box::new(req)).unwrap();
    }
    let loop_ref = handle.loop_ref();
    drop(handle);

    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(dropped.load(Ordering::SeqCst), 3);
    assert_eq!(loop_ref.stats().discarded_on_shutdown, 3);
}

#[test]
fn test_endless_continue_is_dropped_on_shutdown() {
    let ran = Arc::new(AtomicUsize::new(0));
    let dropped = Arc::new(AtomicUsize::new(0));

    let mut handle = started_loop("endless", 4, 1);
    let req = Tracked {
        ran: Arc::clone(&ran),
        dropped: Arc::clone(&dropped),
        outcome: Execution::Continue,
    };
    handle.post_request(Box::new(req)).unwrap();
    wait_until(|| ran.load(Ordering::SeqCst) > 5);

    handle.shutdown();
    assert_eq!(dropped.load(Ordering::SeqCst), 1);
    let stats = handle.stats();
    assert_eq!(stats.discarded_on_shutdown, 1);
    assert_eq!(stats.executed, stats.continued);
}

#[test]
fn test_observer_on_standalone_loop() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let observer = {
        let seen = Arc::clone(&seen);
        Arc::new(FnObserver(move |event: &ExecutionEvent<'_>, _outcome: Execution| {
            let name = event.loop_name.to_string();
            seen.lock().unwrap().push((event.worker, name, event.native_thread));
        }))
    };

    let event_loop = EventLoop::new().with_name("observed").observer(observer);
    let mut handle = EventLoopHandle::new(event_loop, 4, 1).unwrap();
    handle.start().unwrap();
    handle.blocking_request(request_fn(|_| {})).unwrap();
    handle.shutdown();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, None);
    assert_eq!(seen[0].1, "observed");
    assert_eq!(Some(seen[0].2), handle.native_thread_id());
}

#[test]
fn test_single_producer_order_preserved() {
    let mut handle = started_loop("ordered", 64, 4);
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..500 {
        let order = Arc::clone(&order);
        handle
            .blocking_request(request_fn(move |_| order.lock().unwrap().push(i)))
            .unwrap();
    }
    handle.shutdown();

    let order = order.lock().unwrap();
    assert_eq!(*order, (0..500).collect::<Vec<_>>());
}

#[test]
fn test_panicking_request_stops_accepting_posts() {
    let mut handle = started_loop("panicky", 2, 1);
    handle.post_request(request_fn(|_| panic!("request failed"))).unwrap();
    wait_until(|| !handle.is_running());

    let ran = Arc::new(AtomicUsize::new(0));
    let post = |ran: &Arc<AtomicUsize>| {
        let ran = Arc::clone(ran);
        request_fn(move |_| {
            ran.fetch_add(1, Ordering::SeqCst);
        })
    };
    let err = handle.post_request(post(&ran)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NoBufs);
    assert_eq!(err.reason(), RejectReason::Closed);

    // A blocked producer is released rather than waiting forever
    let loop_ref = handle.loop_ref();
    let request = post(&ran);
    let producer = thread::spawn(move || loop_ref.blocking_request(request));
    assert_eq!(producer.join().unwrap().unwrap_err().code(), ErrorCode::Shutdown);

    handle.join();
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(handle.queued(), 0);
}

#[test]
fn test_continue_only_loop_does_not_spin() {
    let ran = Arc::new(AtomicUsize::new(0));
    let dropped = Arc::new(AtomicUsize::new(0));

    let mut handle = started_loop("backoff", 4, 1);
    let req = Tracked {
        ran: Arc::clone(&ran),
        dropped: Arc::clone(&dropped),
        outcome: Execution::Continue,
    };
    handle.post_request(Box::new(req)).unwrap();
    wait_until(|| ran.load(Ordering::SeqCst) > 0);

    let before = handle.stats().iterations;
    thread::sleep(Duration::from_millis(100));
    let spent = handle.stats().iterations - before;
    handle.shutdown();

    // Still re-invoked, but with a pause between rounds
    assert!(spent > 10, "continue request starved: {spent} iterations");
    assert!(spent < 2_000, "loop spun: {spent} iterations");
}
