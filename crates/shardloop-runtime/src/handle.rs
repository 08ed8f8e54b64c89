//! Owning and non-owning handles to a running event loop

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use shardloop_core::{ConfigError, LoopId, SpawnError};
use tracing::{debug, error, warn};

use crate::config::validate_queue;
use crate::event_loop::{EventLoop, LoopShared};
use crate::request::{BoxedRequest, PostResult};
use crate::stats::LoopStats;
use crate::tls;

/// Owns an event loop thread and its bounded mailbox.
///
/// Posting never blocks the caller unless it asks to with
/// `blocking_request`. Dropping the handle stops the loop, lets it drain,
/// and joins its thread.
pub struct EventLoopHandle {
    shared: Arc<LoopShared>,
    /// The loop until `start()` moves it onto its thread. Behind a mutex
    /// only so the handle is `Sync`; it is never contended.
    pending: Mutex<Option<EventLoop>>,
    thread: Option<JoinHandle<()>>,
}

impl EventLoopHandle {
    /// Wrap `event_loop` with a mailbox of `capacity` slots. The loop
    /// executes at most `requests_per_iteration` mailbox requests between
    /// timer checks.
    pub fn new(
        event_loop: EventLoop,
        capacity: usize,
        requests_per_iteration: usize,
    ) -> Result<Self, ConfigError> {
        validate_queue(capacity, requests_per_iteration)?;
        if event_loop.drain_passes() == 0 {
            return Err(ConfigError::ZeroDrainPasses);
        }
        if event_loop.idle_poll().is_zero() {
            return Err(ConfigError::ZeroIdlePollInterval);
        }

        let shared = Arc::new(LoopShared::new(
            event_loop.id(),
            event_loop.name().to_string(),
            capacity,
            requests_per_iteration,
        ));
        Ok(Self {
            shared,
            pending: Mutex::new(Some(event_loop)),
            thread: None,
        })
    }

    /// Spawn the loop thread
    pub fn start(&mut self) -> Result<(), SpawnError> {
        let event_loop = self
            .pending
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SpawnError::AlreadyStarted)?;
        let shared = Arc::clone(&self.shared);

        let spawned = thread::Builder::new()
            .name(self.shared.name.clone())
            .spawn(move || event_loop.run(shared));

        match spawned {
            Ok(thread) => {
                debug!(
                    loop_name = %self.shared.name,
                    loop_id = %self.shared.id,
                    "event loop thread spawned"
                );
                self.thread = Some(thread);
                Ok(())
            }
            Err(e) => {
                error!(
                    loop_name = %self.shared.name,
                    error = %e,
                    "failed to spawn event loop thread"
                );
                self.shared.request_stop();
                Err(SpawnError::Os(e))
            }
        }
    }

    pub(crate) fn event_loop_mut(&mut self) -> Option<&mut EventLoop> {
        self.pending.get_mut().unwrap_or_else(PoisonError::into_inner).as_mut()
    }

    /// Hand `request` to the loop without blocking.
    ///
    /// Fails with `NoBufs` when the mailbox is full or the loop is
    /// stopping; the request comes back inside the error.
    pub fn post_request(&self, request: BoxedRequest) -> PostResult {
        self.shared.post(request)
    }

    /// Hand `request` to the loop, waiting while the mailbox is full.
    ///
    /// Fails with `Shutdown` once the loop is stopping. Called from the
    /// loop's own thread it behaves like `post_request`.
    pub fn blocking_request(&self, request: BoxedRequest) -> PostResult {
        self.shared.post_blocking(request)
    }

    /// Close the mailbox and tell the loop to wind down. Does not wait.
    pub fn request_stop(&self) {
        self.shared.request_stop();
    }

    /// Wait for the loop thread to exit. Requests that slipped into the
    /// mailbox after the loop's final drain are dropped here.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if tls::current_loop_id() == self.shared.id {
                warn!(
                    loop_name = %self.shared.name,
                    "event loop handle released on its own thread, not joining"
                );
                return;
            }
            if thread.join().is_err() {
                error!(loop_name = %self.shared.name, "event loop thread panicked");
            }
        }
        self.shared.discard_pending();
    }

    /// `request_stop()` then `join()`. Idempotent.
    pub fn shutdown(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Non-owning handle for posting from elsewhere
    pub fn loop_ref(&self) -> LoopRef {
        LoopRef::new(Arc::clone(&self.shared))
    }

    #[inline]
    pub fn id(&self) -> LoopId {
        self.shared.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.mailbox.capacity()
    }

    /// Requests waiting in the mailbox
    #[inline]
    pub fn queued(&self) -> usize {
        self.shared.mailbox.len()
    }

    /// Started and not yet exited
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn thread_id(&self) -> Option<ThreadId> {
        self.thread.as_ref().map(|t| t.thread().id())
    }

    /// pthread id of the loop thread, once it has started running
    pub fn native_thread_id(&self) -> Option<u64> {
        self.shared.native_thread()
    }

    pub fn stats(&self) -> LoopStats {
        self.shared.counters.snapshot()
    }
}

impl Drop for EventLoopHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for EventLoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoopHandle")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("capacity", &self.capacity())
            .field("queued", &self.queued())
            .field("blocked_producers", &self.shared.mailbox.blocked_producers())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Cloneable, non-owning handle to a loop's mailbox.
///
/// Keeps the mailbox alive but not the thread: once the owning
/// `EventLoopHandle` shuts the loop down, posts fail with `NoBufs`.
#[derive(Clone)]
pub struct LoopRef {
    shared: Arc<LoopShared>,
}

impl LoopRef {
    pub(crate) fn new(shared: Arc<LoopShared>) -> Self {
        Self { shared }
    }

    pub fn post_request(&self, request: BoxedRequest) -> PostResult {
        self.shared.post(request)
    }

    pub fn blocking_request(&self, request: BoxedRequest) -> PostResult {
        self.shared.post_blocking(request)
    }

    #[inline]
    pub fn id(&self) -> LoopId {
        self.shared.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    #[inline]
    pub fn queued(&self) -> usize {
        self.shared.mailbox.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.mailbox.capacity()
    }

    /// True once the loop stopped accepting posts
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.shared.mailbox.is_closed()
    }

    pub fn stats(&self) -> LoopStats {
        self.shared.counters.snapshot()
    }

    pub(crate) fn request_stop(&self) {
        self.shared.request_stop();
    }

    pub(crate) fn discard_pending(&self) -> usize {
        self.shared.discard_pending()
    }
}

impl std::fmt::Debug for LoopRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopRef")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .finish()
    }
}
