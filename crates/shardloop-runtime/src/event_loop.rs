//! The event loop: one thread draining one mailbox
//!
//! Each iteration:
//!
//! 1. Fire expired timers
//! 2. Re-invoke requests that returned `Continue` last time
//! 3. Pop and execute up to `requests_per_iteration` mailbox requests,
//!    one at a time
//! 4. If nothing happened, park until a post, the next timer deadline,
//!    or the idle poll interval. Requests that only returned `Continue`
//!    do not count as progress; they get a short backoff park instead.
//!
//! A request that panics takes the loop thread down. The mailbox is
//! closed and emptied on the way out so producers get an error rather
//! than queueing into a dead loop.
//!
//! On stop the loop makes a bounded number of drain passes. Each pass
//! executes at most what was queued when the pass began, so producers
//! that keep posting cannot hold the loop open. Whatever is left is
//! dropped without being executed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use shardloop_core::{set_last_error, Execution, LoopId, RejectReason, WorkerId};
use tracing::{debug, error, trace, warn};

use crate::config::defaults;
use crate::context::LoopContext;
use crate::mailbox::Mailbox;
use crate::observer::{ExecutionEvent, ExecutionObserver};
use crate::request::{BoxedRequest, PostResult};
use crate::stats::{add, bump, LoopCounters};
use crate::timer::TimerQueue;
use crate::tls;
use crate::worker::WorkerIdentity;

/// State shared between a loop thread and everyone posting to it
pub(crate) struct LoopShared {
    pub(crate) id: LoopId,
    pub(crate) name: String,
    pub(crate) mailbox: Mailbox<BoxedRequest>,
    pub(crate) counters: LoopCounters,
    pub(crate) requests_per_iteration: usize,
    stop: AtomicBool,
    native_thread: OnceLock<u64>,
}

impl LoopShared {
    pub(crate) fn new(
        id: LoopId,
        name: String,
        capacity: usize,
        requests_per_iteration: usize,
    ) -> Self {
        Self {
            id,
            name,
            mailbox: Mailbox::new(capacity),
            counters: LoopCounters::default(),
            requests_per_iteration,
            stop: AtomicBool::new(false),
            native_thread: OnceLock::new(),
        }
    }

    pub(crate) fn post(&self, request: BoxedRequest) -> PostResult {
        let result = self.mailbox.try_push(request);
        self.account(result)
    }

    /// Waits for space. On the loop's own thread nobody would ever make
    /// space, so it degrades to a non-blocking post there.
    pub(crate) fn post_blocking(&self, request: BoxedRequest) -> PostResult {
        if tls::current_loop_id() == self.id {
            trace!(loop_name = %self.name, "blocking post from own thread, not waiting");
            return self.post(request);
        }
        let result = self.mailbox.push_blocking(request);
        self.account(result)
    }

    fn account(&self, result: PostResult) -> PostResult {
        match &result {
            Ok(()) => bump(&self.counters.posted),
            Err(err) => {
                match err.reason() {
                    RejectReason::Full => bump(&self.counters.rejected_full),
                    RejectReason::Closed => bump(&self.counters.rejected_closed),
                }
                set_last_error(err.code());
                trace!(
                    loop_name = %self.name,
                    request_type = %err.request().request_type(),
                    reason = %err.reason(),
                    "request rejected"
                );
            }
        }
        result
    }

    /// Stop accepting posts and wake the loop so it can wind down
    pub(crate) fn request_stop(&self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            debug!(loop_name = %self.name, "stop requested");
        }
        self.mailbox.close();
    }

    #[inline]
    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Drop requests that raced into the mailbox after the loop exited
    pub(crate) fn discard_pending(&self) -> usize {
        let late = self.mailbox.drain();
        if late > 0 {
            add(&self.counters.discarded_on_shutdown, late as u64);
            debug!(loop_name = %self.name, late, "discarded requests posted during shutdown");
        }
        late
    }

    pub(crate) fn native_thread(&self) -> Option<u64> {
        self.native_thread.get().copied()
    }
}

/// A loop that has not been started yet.
///
/// Hand it to `EventLoopHandle::new` together with the mailbox sizing,
/// then `start()` the handle.
///
/// ```ignore
/// let mut handle = EventLoopHandle::new(EventLoop::new().with_name("flusher"), 64, 8)?;
/// handle.start()?;
/// handle.post_request(request_fn(|ctx| tracing::info!(loop_name = ctx.loop_name(), "hello")))?;
/// ```
pub struct EventLoop {
    id: LoopId,
    name: String,
    idle_poll_interval: Duration,
    shutdown_drain_passes: usize,
    observer: Option<Arc<dyn ExecutionObserver>>,
    worker: Option<WorkerIdentity>,
    timers: TimerQueue,
    deferred: VecDeque<BoxedRequest>,
    thread: ThreadId,
    native_thread: u64,
}

impl EventLoop {
    pub fn new() -> Self {
        let id = LoopId::next();
        Self {
            id,
            name: format!("shardloop-loop-{}", id.as_u64()),
            idle_poll_interval: Duration::from_millis(defaults::IDLE_POLL_MS),
            shutdown_drain_passes: defaults::SHUTDOWN_DRAIN_PASSES,
            observer: None,
            worker: None,
            timers: TimerQueue::new(),
            deferred: VecDeque::new(),
            thread: thread::current().id(),
            native_thread: 0,
        }
    }

    /// Thread name, also used in log spans
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn idle_poll_interval(mut self, interval: Duration) -> Self {
        self.idle_poll_interval = interval;
        self
    }

    pub fn shutdown_drain_passes(mut self, passes: usize) -> Self {
        self.shutdown_drain_passes = passes;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    #[inline]
    pub fn id(&self) -> LoopId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub(crate) fn drain_passes(&self) -> usize {
        self.shutdown_drain_passes
    }

    #[inline]
    pub(crate) fn idle_poll(&self) -> Duration {
        self.idle_poll_interval
    }

    pub(crate) fn attach_worker(&mut self, identity: WorkerIdentity) {
        self.worker = Some(identity);
    }

    fn worker_id(&self) -> Option<WorkerId> {
        self.worker.as_ref().map(|w| w.id)
    }

    /// Thread body. Returns once stopped and drained.
    pub(crate) fn run(mut self, shared: Arc<LoopShared>) {
        let worker = self.worker_id();
        self.thread = thread::current().id();
        self.native_thread = tls::native_thread_id();
        let _ = shared.native_thread.set(self.native_thread);
        tls::enter_loop(self.id);
        let _exit = CloseOnExit(&shared);

        let span = tracing::debug_span!("event_loop", name = %self.name, worker = ?worker);
        let _enter = span.enter();
        debug!(
            capacity = shared.mailbox.capacity(),
            requests_per_iteration = shared.requests_per_iteration,
            "event loop started"
        );

        while !shared.stop_requested() {
            if !self.run_once(&shared) {
                let mut timeout = self.park_timeout();
                if !self.deferred.is_empty() {
                    timeout = timeout.min(Duration::from_micros(defaults::CONTINUE_BACKOFF_US));
                }
                shared.mailbox.park(Some(timeout));
            }
        }

        self.wind_down(&shared);
    }

    /// One iteration. Returns false if no timer fired and the mailbox
    /// was empty.
    fn run_once(&mut self, shared: &Arc<LoopShared>) -> bool {
        bump(&shared.counters.iterations);

        let mut progressed = self.fire_timers(shared) > 0;
        self.run_deferred(shared);

        for _ in 0..shared.requests_per_iteration {
            let Some(request) = shared.mailbox.pop() else {
                break;
            };
            self.execute(request, shared);
            progressed = true;
        }
        progressed
    }

    fn park_timeout(&mut self) -> Duration {
        match self.timers.next_deadline() {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(self.idle_poll_interval),
            None => self.idle_poll_interval,
        }
    }

    fn fire_timers(&mut self, shared: &Arc<LoopShared>) -> usize {
        let expired = self.timers.pop_expired(Instant::now());
        if expired.is_empty() {
            return 0;
        }

        let now = Instant::now();
        let mut fired = 0;
        for mut entry in expired {
            if !self.timers.claim(&entry) {
                continue;
            }
            {
                let mut ctx = LoopContext::new(shared, &mut self.timers, self.worker.as_ref());
                (entry.callback)(&mut ctx);
            }
            fired += 1;
            if entry.kind.is_periodic() {
                self.timers.rearm(entry, now);
            }
        }

        add(&shared.counters.timers_fired, fired as u64);
        trace!(fired, "timers fired");
        fired
    }

    /// Re-invoke every request deferred by a previous `Continue`.
    /// Requests that continue again wait for the next call.
    fn run_deferred(&mut self, shared: &Arc<LoopShared>) -> usize {
        let n = self.deferred.len();
        for _ in 0..n {
            if let Some(request) = self.deferred.pop_front() {
                self.execute(request, shared);
            }
        }
        n
    }

    fn execute(&mut self, mut request: BoxedRequest, shared: &Arc<LoopShared>) {
        let event = ExecutionEvent {
            loop_id: self.id,
            loop_name: &self.name,
            worker: self.worker.as_ref().map(|w| w.id),
            thread: self.thread,
            native_thread: self.native_thread,
            request_type: request.request_type(),
        };

        if let Some(observer) = &self.observer {
            observer.before_execute(&event);
        }

        let outcome = {
            let mut ctx = LoopContext::new(shared, &mut self.timers, self.worker.as_ref());
            request.execute(&mut ctx)
        };
        bump(&shared.counters.executed);

        if let Some(observer) = &self.observer {
            observer.after_execute(&event, outcome);
        }
        trace!(request_type = %event.request_type, ?outcome, "executed");

        if outcome == Execution::Continue {
            bump(&shared.counters.continued);
            self.deferred.push_back(request);
        }
    }

    fn wind_down(&mut self, shared: &Arc<LoopShared>) {
        shared.mailbox.close();

        let mut drained = 0;
        for pass in 0..self.shutdown_drain_passes {
            if self.deferred.is_empty() && shared.mailbox.len() == 0 {
                break;
            }
            drained += self.run_deferred(shared);
            let queued = shared.mailbox.len();
            for _ in 0..queued {
                let Some(request) = shared.mailbox.pop() else {
                    break;
                };
                self.execute(request, shared);
                drained += 1;
            }
            trace!(pass, drained, "drain pass complete");
        }

        let discarded = shared.mailbox.drain() + self.deferred.len();
        self.deferred.clear();
        let timers_dropped = self.timers.clear();
        add(&shared.counters.discarded_on_shutdown, discarded as u64);

        if discarded > 0 {
            warn!(discarded, "dropping unexecuted requests on shutdown");
        }
        debug!(drained, timers_dropped, "event loop stopped");
    }
}

/// Closes the mailbox when the loop thread exits, including by panic
struct CloseOnExit<'a>(&'a LoopShared);

impl Drop for CloseOnExit<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(loop_name = %self.0.name, "request panicked, event loop thread exiting");
            self.0.request_stop();
            self.0.discard_pending();
        }
        tls::leave_loop();
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("worker", &self.worker_id())
            .field("idle_poll_interval", &self.idle_poll_interval)
            .field("shutdown_drain_passes", &self.shutdown_drain_passes)
            .finish_non_exhaustive()
    }
}
