//! Processor workers
//!
//! A worker is one shard of a `Processor`: an event loop thread plus
//! its index. Requests running on the worker's loop reach the index and
//! the owning processor through `LoopContext`.

use std::sync::Arc;
use std::thread::ThreadId;

use shardloop_core::{ConfigError, SpawnError, WorkerId};

use crate::config::ProcessorSettings;
use crate::event_loop::EventLoop;
use crate::handle::{EventLoopHandle, LoopRef};
use crate::observer::ExecutionObserver;
use crate::processor::ProcessorRef;
use crate::request::{BoxedRequest, PostResult};
use crate::stats::LoopStats;

/// Carried by a worker's loop so executing requests can find their
/// shard and processor
pub(crate) struct WorkerIdentity {
    pub(crate) id: WorkerId,
    pub(crate) processor: ProcessorRef,
}

pub struct Worker {
    id: WorkerId,
    handle: EventLoopHandle,
}

impl Worker {
    /// Build worker `index` from processor settings. The loop is not
    /// started until `start()`.
    pub(crate) fn new(
        index: usize,
        settings: &ProcessorSettings,
        observer: Option<Arc<dyn ExecutionObserver>>,
    ) -> Result<Self, ConfigError> {
        let mut event_loop = EventLoop::new()
            .with_name(settings.thread_name(index))
            .idle_poll_interval(settings.idle_poll_interval)
            .shutdown_drain_passes(settings.shutdown_drain_passes);
        if let Some(observer) = observer {
            event_loop = event_loop.observer(observer);
        }

        let handle = EventLoopHandle::new(
            event_loop,
            settings.queue_capacity,
            settings.requests_per_iteration,
        )?;
        Ok(Self {
            id: WorkerId::new(index),
            handle,
        })
    }

    /// Give the not-yet-started loop its back-reference
    pub(crate) fn attach(&mut self, processor: ProcessorRef) {
        let id = self.id;
        if let Some(event_loop) = self.handle.event_loop_mut() {
            event_loop.attach_worker(WorkerIdentity { id, processor });
        }
    }

    pub(crate) fn start(&mut self) -> Result<(), SpawnError> {
        self.handle.start()
    }

    pub(crate) fn loop_ref(&self) -> LoopRef {
        self.handle.loop_ref()
    }

    pub(crate) fn handle_mut(&mut self) -> &mut EventLoopHandle {
        &mut self.handle
    }

    #[inline]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    #[inline]
    pub fn handle(&self) -> &EventLoopHandle {
        &self.handle
    }

    /// Post directly to this worker, bypassing affinity and routing
    pub fn post_request(&self, request: BoxedRequest) -> PostResult {
        self.handle.post_request(request)
    }

    pub fn blocking_request(&self, request: BoxedRequest) -> PostResult {
        self.handle.blocking_request(request)
    }

    pub fn thread_id(&self) -> Option<ThreadId> {
        self.handle.thread_id()
    }

    pub fn stats(&self) -> LoopStats {
        self.handle.stats()
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker").field("id", &self.id).field("handle", &self.handle).finish()
    }
}
