//! The processor: a fixed set of worker loops behind one posting API
//!
//! # Routing
//!
//! `post_request` asks the request for its `ThreadAffinity` once. A
//! pinned request goes to that worker; `Any` goes wherever the routing
//! policy says (round-robin unless configured otherwise). A pinned index
//! outside `[0, num_workers)` is a bug in the request and panics.
//!
//! # Shutdown
//!
//! Workers commonly post to each other, so shutdown has to be safe while
//! requests are in flight between loops:
//!
//! 1. Raise the shutting-down flag. New posts through the processor fail
//!    with `NoBufs` (blocking posts with `Shutdown`).
//! 2. Close every mailbox and wake every loop, before joining any of
//!    them. A loop still executing can keep posting to a peer, and the
//!    post fails cleanly instead of landing in a loop that is gone.
//! 3. Join every loop thread. Each drains its mailbox with bounded passes
//!    and drops what is left.
//! 4. Sweep the mailboxes once more for posts that raced the close.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use shardloop_core::{set_last_error, PostError, ProcessorError, WorkerId};
use tracing::{error, info};

use crate::config::ProcessorSettings;
use crate::handle::LoopRef;
use crate::observer::ExecutionObserver;
use crate::request::{BoxedRequest, PostResult};
use crate::routing::RoutingPolicy;
use crate::stats::LoopStats;
use crate::worker::Worker;

struct ProcessorShared {
    loops: Vec<LoopRef>,
    routing: Box<dyn RoutingPolicy>,
    shutting_down: AtomicBool,
}

/// Cloneable, non-owning handle to a processor.
///
/// Requests reach it through `LoopContext::processor()` to post to other
/// workers. It does not keep the worker threads alive: after the owning
/// `Processor` shuts down every post fails.
#[derive(Clone)]
pub struct ProcessorRef {
    inner: Arc<ProcessorShared>,
}

impl ProcessorRef {
    /// Route by affinity and post without blocking
    pub fn post_request(&self, request: BoxedRequest) -> PostResult {
        match self.route(&request) {
            Some(index) => self.inner.loops[index].post_request(request),
            None => Err(reject(PostError::closed(request))),
        }
    }

    /// Route by affinity and wait for mailbox space
    pub fn blocking_request(&self, request: BoxedRequest) -> PostResult {
        match self.route(&request) {
            Some(index) => self.inner.loops[index].blocking_request(request),
            None => Err(reject(PostError::shutdown(request))),
        }
    }

    /// Post to `worker` regardless of the request's own affinity.
    ///
    /// # Panics
    ///
    /// Panics if `worker` is out of range.
    pub fn post_to(&self, worker: WorkerId, request: BoxedRequest) -> PostResult {
        let num_workers = self.num_workers();
        let Some(loop_ref) = self.inner.loops.get(worker.index()) else {
            panic!("post_to worker {} but processor has {} workers", worker, num_workers);
        };
        if self.is_shutting_down() {
            return Err(reject(PostError::closed(request)));
        }
        loop_ref.post_request(request)
    }

    #[inline]
    pub fn num_workers(&self) -> usize {
        self.inner.loops.len()
    }

    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Mailbox of worker `id`
    pub fn worker_loop(&self, id: WorkerId) -> Option<&LoopRef> {
        self.inner.loops.get(id.index())
    }

    /// `None` once shutting down
    fn route(&self, request: &BoxedRequest) -> Option<usize> {
        if self.is_shutting_down() {
            return None;
        }
        let n = self.num_workers();
        match request.thread_affinity(n).resolve(n) {
            Ok(Some(index)) => Some(index),
            Ok(None) => {
                let loops = &self.inner.loops;
                Some(self.inner.routing.select(n, &|i| loops[i].queued()))
            }
            Err(index) => panic!(
                "request {} pinned to worker {} but processor has {} workers",
                request.request_type(),
                index,
                n
            ),
        }
    }
}

impl std::fmt::Debug for ProcessorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRef")
            .field("num_workers", &self.num_workers())
            .field("routing", &self.inner.routing.name())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

fn reject(err: PostError<BoxedRequest>) -> PostError<BoxedRequest> {
    set_last_error(err.code());
    err
}

/// Owns the worker loops. Dropping it performs the shutdown sequence.
///
/// ```ignore
/// let processor = Processor::new(ProcessorSettings::from_env().num_workers(4))?;
/// processor.post_request(request_fn(|ctx| tracing::info!(worker = ?ctx.worker_id(), "hello")))?;
/// drop(processor);
/// ```
pub struct Processor {
    shared: ProcessorRef,
    workers: Vec<Worker>,
    settings: ProcessorSettings,
    shut_down: bool,
}

impl Processor {
    /// Start `settings.num_workers` loops with default routing and no
    /// observer
    pub fn new(settings: ProcessorSettings) -> Result<Self, ProcessorError> {
        Self::builder(settings).build()
    }

    pub fn builder(settings: ProcessorSettings) -> ProcessorBuilder {
        ProcessorBuilder {
            settings,
            observer: None,
            routing: None,
        }
    }

    /// See `ProcessorRef::post_request`
    pub fn post_request(&self, request: BoxedRequest) -> PostResult {
        self.shared.post_request(request)
    }

    /// See `ProcessorRef::blocking_request`
    pub fn blocking_request(&self, request: BoxedRequest) -> PostResult {
        self.shared.blocking_request(request)
    }

    /// See `ProcessorRef::post_to`
    pub fn post_to(&self, worker: WorkerId, request: BoxedRequest) -> PostResult {
        self.shared.post_to(worker, request)
    }

    pub fn processor_ref(&self) -> ProcessorRef {
        self.shared.clone()
    }

    #[inline]
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn worker(&self, id: WorkerId) -> Option<&Worker> {
        self.workers.get(id.index())
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.shared.is_shutting_down()
    }

    /// Per-worker counters, indexed by worker
    pub fn stats(&self) -> Vec<LoopStats> {
        self.workers.iter().map(Worker::stats).collect()
    }

    /// Counters summed over all workers
    pub fn total_stats(&self) -> LoopStats {
        self.workers.iter().map(Worker::stats).sum()
    }

    /// Stop and join every worker. Idempotent; also run on drop.
    ///
    /// Workers stay reachable afterwards for their final stats.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let start = Instant::now();
        info!(num_workers = self.workers.len(), "processor shutting down");

        self.shared.inner.shutting_down.store(true, Ordering::SeqCst);
        for loop_ref in &self.shared.inner.loops {
            loop_ref.request_stop();
        }
        for worker in &mut self.workers {
            worker.handle_mut().join();
        }
        let late: usize = self.shared.inner.loops.iter().map(LoopRef::discard_pending).sum();

        let totals = self.total_stats();
        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            executed = totals.executed,
            discarded = totals.discarded_on_shutdown,
            late,
            "processor shut down"
        );
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("workers", &self.workers)
            .field("routing", &self.shared.inner.routing.name())
            .field("shut_down", &self.shut_down)
            .finish()
    }
}

/// Processor construction with an optional observer and routing policy
pub struct ProcessorBuilder {
    settings: ProcessorSettings,
    observer: Option<Arc<dyn ExecutionObserver>>,
    routing: Option<Box<dyn RoutingPolicy>>,
}

impl ProcessorBuilder {
    /// Install `observer` on every worker loop
    pub fn observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Override `settings.routing` with a custom policy
    pub fn routing_policy(mut self, policy: impl RoutingPolicy + 'static) -> Self {
        self.routing = Some(Box::new(policy));
        self
    }

    pub fn build(self) -> Result<Processor, ProcessorError> {
        let ProcessorBuilder { settings, observer, routing } = self;
        settings.validate()?;

        let mut workers = (0..settings.num_workers)
            .map(|i| Worker::new(i, &settings, observer.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        let routing = routing.unwrap_or_else(|| settings.routing.build());
        let shared = ProcessorRef {
            inner: Arc::new(ProcessorShared {
                loops: workers.iter().map(Worker::loop_ref).collect(),
                routing,
                shutting_down: AtomicBool::new(false),
            }),
        };
        for worker in &mut workers {
            worker.attach(shared.clone());
        }

        let mut processor = Processor {
            shared,
            workers,
            settings,
            shut_down: false,
        };
        for index in 0..processor.workers.len() {
            if let Err(source) = processor.workers[index].start() {
                error!(
                    worker = index,
                    error = %source,
                    "failed to start worker, stopping the rest"
                );
                processor.shutdown();
                return Err(ProcessorError::Spawn {
                    worker: index,
                    source,
                });
            }
        }

        info!(
            num_workers = processor.workers.len(),
            queue_capacity = processor.settings.queue_capacity,
            routing = processor.shared.inner.routing.name(),
            "processor started"
        );
        Ok(processor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{request_fn, FnRequest};
    use shardloop_core::{last_error, ConfigError, ErrorCode, Execution};

    fn settings(n: usize) -> ProcessorSettings {
        ProcessorSettings::new().num_workers(n)
    }

    #[test]
    fn test_invalid_settings() {
        let err = Processor::new(settings(0)).unwrap_err();
        assert!(matches!(err, ProcessorError::Config(ConfigError::ZeroWorkers)));
        assert_eq!(err.code(), ErrorCode::InvalidParam);
    }

    #[test]
    fn test_shutdown_idempotent() {
        let mut processor = Processor::new(settings(2)).unwrap();
        assert!(!processor.is_shutting_down());
        processor.shutdown();
        assert!(processor.is_shutting_down());
        processor.shutdown();
        assert_eq!(processor.num_workers(), 2);
    }

    #[test]
    fn test_posts_rejected_after_shutdown() {
        let mut processor = Processor::new(settings(2)).unwrap();
        let handle = processor.processor_ref();
        processor.shutdown();

        let err = handle.post_request(request_fn(|_| {})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoBufs);
        assert_eq!(last_error(), ErrorCode::NoBufs);

        let err = handle.blocking_request(request_fn(|_| {})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Shutdown);

        assert!(handle.post_to(WorkerId::new(1), request_fn(|_| {})).is_err());
    }

    #[test]
    #[should_panic(expected = "pinned to worker 5")]
    fn test_out_of_range_affinity_panics() {
        let processor = Processor::new(settings(2)).unwrap();
        let request = FnRequest::new(|_| Execution::Complete).on_worker(5);
        let _ = processor.post_request(request.boxed());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    #[should_panic(expected = "pinned to worker 4294967296")]
    fn test_huge_affinity_panics_instead_of_wrapping() {
        let processor = Processor::new(settings(2)).unwrap();
        let request = FnRequest::new(|_| Execution::Complete).on_worker(u32::MAX as usize + 1);
        let _ = processor.post_request(request.boxed());
    }

    #[test]
    fn test_debug_shows_routing() {
        let processor = Processor::new(settings(1)).unwrap();
        assert!(format!("{:?}", processor.processor_ref()).contains("round-robin"));
    }
}
