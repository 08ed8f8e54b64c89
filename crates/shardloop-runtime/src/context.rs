//! What a running request (or timer callback) can see of its loop

use std::sync::Arc;

use shardloop_core::{LoopId, WorkerId};

use crate::event_loop::LoopShared;
use crate::handle::LoopRef;
use crate::processor::ProcessorRef;
use crate::request::{BoxedRequest, PostResult};
use crate::timer::TimerQueue;
use crate::worker::WorkerIdentity;

/// Borrowed view of the executing loop.
///
/// Only exists on the loop thread, for the duration of one `execute` or
/// timer callback.
pub struct LoopContext<'a> {
    shared: &'a Arc<LoopShared>,
    timers: &'a mut TimerQueue,
    worker: Option<&'a WorkerIdentity>,
}

impl<'a> LoopContext<'a> {
    pub(crate) fn new(
        shared: &'a Arc<LoopShared>,
        timers: &'a mut TimerQueue,
        worker: Option<&'a WorkerIdentity>,
    ) -> Self {
        Self {
            shared,
            timers,
            worker,
        }
    }

    #[inline]
    pub fn loop_id(&self) -> LoopId {
        self.shared.id
    }

    #[inline]
    pub fn loop_name(&self) -> &str {
        &self.shared.name
    }

    /// Index of the executing worker, `None` on a standalone loop
    #[inline]
    pub fn worker_id(&self) -> Option<WorkerId> {
        self.worker.map(|w| w.id)
    }

    /// The processor owning the executing worker
    #[inline]
    pub fn processor(&self) -> Option<&ProcessorRef> {
        self.worker.map(|w| &w.processor)
    }

    /// This loop's timers
    #[inline]
    pub fn timers(&mut self) -> &mut TimerQueue {
        &mut *self.timers
    }

    #[inline]
    pub fn timers_ref(&self) -> &TimerQueue {
        &*self.timers
    }

    /// Cloneable handle for posting back to this loop later
    pub fn loop_ref(&self) -> LoopRef {
        LoopRef::new(Arc::clone(self.shared))
    }

    /// Post to this same loop without blocking
    pub fn post_here(&self, request: BoxedRequest) -> PostResult {
        self.shared.post(request)
    }

    /// Requests waiting in this loop's mailbox
    #[inline]
    pub fn queued(&self) -> usize {
        self.shared.mailbox.len()
    }

    /// True once the loop has been asked to stop
    #[inline]
    pub fn is_stopping(&self) -> bool {
        self.shared.stop_requested()
    }
}

impl std::fmt::Debug for LoopContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopContext")
            .field("loop_id", &self.shared.id)
            .field("loop_name", &self.shared.name)
            .field("worker", &self.worker_id())
            .finish_non_exhaustive()
    }
}
