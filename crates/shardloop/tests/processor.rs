//! Processor routing, mutual exclusion and shutdown

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use shardloop::prelude::*;
use shardloop::{last_error, ExecutionEvent, ExecutionObserver, FnObserver, RoutingKind};

use common::{wait_until, Semaphore};

fn settings(num_workers: usize) -> ProcessorSettings {
    ProcessorSettings::new().num_workers(num_workers).thread_name_prefix("test-worker")
}

/// Bumps a per-thread counter
struct ThreadCountingRequest {
    affinity: usize,
    counts: Arc<Mutex<HashMap<ThreadId, usize>>>,
}

impl Request for ThreadCountingRequest {
    fn execute(&mut self, _ctx: &mut LoopContext<'_>) -> Execution {
        *self.counts.lock().unwrap().entry(thread::current().id()).or_default() += 1;
        Execution::Complete
    }

    fn thread_affinity(&self, _num_workers: usize) -> ThreadAffinity {
        ThreadAffinity::worker(self.affinity)
    }

    fn request_type(&self) -> RequestType {
        RequestType::new("THREAD_COUNTING")
    }
}

#[test]
fn test_thread_targeting() {
    let processor = Processor::new(settings(3)).unwrap();
    let counts = Arc::new(Mutex::new(HashMap::new()));

    // 100 requests to the first worker, one to each of the others
    for t in 0..3 {
        let n = if t == 0 { 100 } else { 1 };
        for _ in 0..n {
            let req = Box::new(ThreadCountingRequest {
                affinity: t,
                counts: Arc::clone(&counts),
            });
            processor.post_request(req).unwrap();
        }
    }

    // Dropping waits for the work to finish
    drop(processor);

    let mut per_thread: Vec<usize> = counts.lock().unwrap().values().copied().collect();
    per_thread.sort_unstable();
    assert_eq!(per_thread, vec![1, 1, 100]);
}

#[test]
fn test_pinned_request_runs_on_its_worker() {
    let processor = Processor::new(settings(4)).unwrap();
    let done = Arc::new(Semaphore::new());

    for w in 0..4 {
        let expected = processor.worker(WorkerId::new(w)).unwrap().thread_id().unwrap();
        let done = Arc::clone(&done);
        let req = FnRequest::new(move |ctx| {
            assert_eq!(ctx.worker_id(), Some(WorkerId::new(w)));
            assert_eq!(thread::current().id(), expected);
            assert_eq!(ctx.processor().map(|p| p.num_workers()), Some(4));
            done.post();
            Execution::Complete
        })
        .on_worker(w);
        processor.post_request(req.boxed()).unwrap();
    }
    for _ in 0..4 {
        done.wait();
    }
}

/// Tracks how many requests each worker is running at once
#[derive(Default)]
struct InFlight {
    current: [AtomicUsize; 4],
    max: [AtomicUsize; 4],
    total: AtomicUsize,
}

impl ExecutionObserver for InFlight {
    fn before_execute(&self, event: &ExecutionEvent<'_>) {
        let w = event.worker.unwrap().index();
        let now = self.current[w].fetch_add(1, Ordering::SeqCst) + 1;
        self.max[w].fetch_max(now, Ordering::SeqCst);
    }

    fn after_execute(&self, event: &ExecutionEvent<'_>, _outcome: Execution) {
        self.current[event.worker.unwrap().index()].fetch_sub(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_one_request_at_a_time_per_worker() {
    let observer = Arc::new(InFlight::default());
    let processor = Processor::builder(settings(4)).observer(observer.clone()).build().unwrap();
    let processor = Arc::new(processor);

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let processor = Arc::clone(&processor);
            thread::spawn(move || {
                for _ in 0..50 {
                    processor
                        .blocking_request(request_fn(|_| thread::sleep(Duration::from_micros(50))))
                        .unwrap();
                }
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }

    wait_until(|| observer.total.load(Ordering::SeqCst) == 200);
    for w in 0..4 {
        assert_eq!(observer.max[w].load(Ordering::SeqCst), 1, "worker {w}");
    }
}

#[test]
fn test_any_affinity_round_robin() {
    let processor = Processor::new(settings(3)).unwrap();
    let per_worker = Arc::new(Mutex::new(vec![0usize; 3]));

    for _ in 0..9 {
        let per_worker = Arc::clone(&per_worker);
        processor
            .post_request(request_fn(move |ctx| {
                per_worker.lock().unwrap()[ctx.worker_id().unwrap().index()] += 1;
            }))
            .unwrap();
    }
    drop(processor);

    assert_eq!(*per_worker.lock().unwrap(), vec![3, 3, 3]);
}

#[test]
fn test_least_loaded_prefers_idle_worker() {
    let processor = Processor::new(settings(2).routing(RoutingKind::LeastLoaded)).unwrap();
    let gate = Arc::new(Semaphore::new());
    let started = Arc::new(Semaphore::new());

    // Park worker 0 on a slow request and back it up
    {
        let (gate, started) = (Arc::clone(&gate), Arc::clone(&started));
        processor
            .post_to(WorkerId::new(0), request_fn(move |_| {
                started.post();
                gate.wait();
            }))
            .unwrap();
    }
    started.wait();
    for _ in 0..8 {
        processor.post_to(WorkerId::new(0), request_fn(|_| {})).unwrap();
    }

    let landed = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..4 {
        let landed = Arc::clone(&landed);
        processor
            .post_request(request_fn(move |ctx| {
                landed.lock().unwrap().push(ctx.worker_id().unwrap());
            }))
            .unwrap();
    }
    wait_until(|| landed.lock().unwrap().len() == 4);
    assert!(landed.lock().unwrap().iter().all(|w| *w == WorkerId::new(1)));

    gate.post();
}

/// Posts 100 no-ops to its peer, 1ms apart
struct PostToOtherWorkerRequest {
    us: WorkerId,
    them: WorkerId,
    accepted: Arc<AtomicUsize>,
    rejected: Arc<AtomicUsize>,
}

impl Request for PostToOtherWorkerRequest {
    fn execute(&mut self, ctx: &mut LoopContext<'_>) -> Execution {
        let processor = ctx.processor().unwrap().clone();
        for _ in 0..100 {
            let them = self.them.index();
            let noop = FnRequest::new(|_| Execution::Complete).on_worker(them).boxed();
            match processor.post_request(noop) {
                Ok(()) => self.accepted.fetch_add(1, Ordering::SeqCst),
                Err(err) => {
                    assert_eq!(err.code(), ErrorCode::NoBufs);
                    self.rejected.fetch_add(1, Ordering::SeqCst)
                }
            };
            thread::sleep(Duration::from_millis(1));
        }
        Execution::Complete
    }

    fn thread_affinity(&self, _num_workers: usize) -> ThreadAffinity {
        ThreadAffinity::Worker(self.us)
    }
}

#[test]
fn test_shutdown_ping_pong() {
    let processor = Processor::new(settings(2)).unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));

    for w in 0..2 {
        let req = PostToOtherWorkerRequest {
            us: WorkerId::new(w),
            them: WorkerId::new(w).peer(),
            accepted: Arc::clone(&accepted),
            rejected: Arc::clone(&rejected),
        };
        processor.post_request(Box::new(req)).unwrap();
    }

    thread::sleep(Duration::from_millis(20));
    let start = Instant::now();
    drop(processor);

    assert!(start.elapsed() < Duration::from_secs(5));
    // Both senders ran to completion, and posts after shutdown were refused
    assert_eq!(accepted.load(Ordering::SeqCst) + rejected.load(Ordering::SeqCst), 200);
    assert!(rejected.load(Ordering::SeqCst) > 0);
}

#[test]
fn test_shutdown_many_workers() {
    let processor = Processor::new(settings(16)).unwrap();
    assert_eq!(processor.num_workers(), 16);
    assert!(processor.workers().iter().all(|w| w.handle().is_running()));
    drop(processor);
}

#[test]
fn test_post_after_shutdown_is_nobufs() {
    let mut processor = Processor::new(settings(2)).unwrap();
    processor.shutdown();
    assert!(processor.workers().iter().all(|w| !w.handle().is_running()));

    let err = processor.post_request(request_fn(|_| panic!("must not run"))).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NoBufs);
    assert_eq!(last_error(), ErrorCode::NoBufs);

    // The request comes back and can be inspected or retried elsewhere
    let request = err.into_request();
    assert_eq!(request.request_type(), RequestType::CLOSURE);
}

#[test]
fn test_continue_reinvoked_on_same_worker() {
    let processor = Processor::new(settings(2)).unwrap();
    let done = Arc::new(Semaphore::new());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut invocations = 0;
    let req = {
        let (done, seen) = (Arc::clone(&done), Arc::clone(&seen));
        FnRequest::new(move |ctx| {
            invocations += 1;
            seen.lock().unwrap().push((thread::current().id(), ctx.worker_id()));
            if invocations < 4 {
                Execution::Continue
            } else {
                done.post();
                Execution::Complete
            }
        })
        .on_worker(1)
    };
    processor.post_request(req.boxed()).unwrap();
    done.wait();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 4);
    assert!(seen.iter().all(|s| *s == seen[0]));
    assert_eq!(seen[0].1, Some(WorkerId::new(1)));

    wait_until(|| processor.stats()[1].executed == 4);
    assert_eq!(processor.stats()[1].continued, 3);
}

#[test]
fn test_observer_sees_request_types() {
    let types = Arc::new(Mutex::new(Vec::new()));
    let observer = {
        let types = Arc::clone(&types);
        Arc::new(FnObserver(move |event: &ExecutionEvent<'_>, outcome: Execution| {
            types.lock().unwrap().push((event.request_type, outcome, event.loop_name.to_string()));
        }))
    };
    let processor = Processor::builder(settings(1)).observer(observer).build().unwrap();

    const APPEND: RequestType = RequestType::new("APPEND");
    processor
        .post_request(FnRequest::new(|_| Execution::Complete).with_type(APPEND).boxed())
        .unwrap();
    drop(processor);

    let types = types.lock().unwrap();
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].0, APPEND);
    assert_eq!(types[0].1, Execution::Complete);
    assert_eq!(types[0].2, "test-worker-0");
}

#[test]
fn test_queued_work_runs_before_shutdown_completes() {
    let processor = Processor::new(settings(2).queue_capacity(64)).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    for i in 0..60 {
        let ran = Arc::clone(&ran);
        let req = FnRequest::new(move |_| {
            ran.fetch_add(1, Ordering::SeqCst);
            Execution::Complete
        })
        .on_worker(i % 2);
        processor.post_request(req.boxed()).unwrap();
    }

    let mut processor = processor;
    processor.shutdown();
    assert_eq!(ran.load(Ordering::SeqCst), 60);
    let totals = processor.total_stats();
    assert_eq!(totals.posted, 60);
    assert_eq!(totals.executed, 60);
    assert_eq!(totals.discarded_on_shutdown, 0);
}
