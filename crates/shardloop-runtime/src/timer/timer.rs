//! Reusable one-shot timer bound to an event loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use shardloop_core::LoopId;

use super::entry::TimerHandle;
use crate::context::LoopContext;

type TimerFn = Box<dyn FnMut(&mut LoopContext<'_>) + Send>;

struct TimerCore {
    callback: Mutex<TimerFn>,
    /// Cleared when the owning `Timer` is dropped
    live: AtomicBool,
}

/// A callback that can be armed, re-armed and cancelled on one loop.
///
/// `assign` binds the timer to the loop it is called on. From then on
/// `activate` and `cancel` must be called from that same loop, typically
/// from inside a request's `execute` or another timer callback. Calling
/// them from a different loop is a programming error and panics.
///
/// Dropping an armed `Timer` cancels it: the pending firing becomes a
/// no-op.
///
/// ```ignore
/// struct Flush { timer: Timer }
///
/// impl Request for Flush {
///     fn execute(&mut self, ctx: &mut LoopContext<'_>) -> Execution {
///         self.timer.assign(ctx, |ctx| tracing::info!(loop_name = ctx.loop_name(), "flush"));
///         self.timer.activate(ctx, Duration::from_millis(5));
///         Execution::Complete
///     }
/// }
/// ```
pub struct Timer {
    core: Option<Arc<TimerCore>>,
    owner: LoopId,
    armed: Option<TimerHandle>,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            core: None,
            owner: LoopId::NONE,
            armed: None,
        }
    }

    /// Bind to the calling loop with `callback`. Re-assigning cancels any
    /// pending firing of the previous callback.
    pub fn assign<F>(&mut self, ctx: &mut LoopContext<'_>, callback: F)
    where
        F: FnMut(&mut LoopContext<'_>) + Send + 'static,
    {
        if self.owner == ctx.loop_id() {
            self.cancel(ctx);
        } else {
            // The old loop's entry becomes a no-op once retired.
            self.armed = None;
        }
        self.retire();
        self.owner = ctx.loop_id();
        self.core = Some(Arc::new(TimerCore {
            callback: Mutex::new(Box::new(callback)),
            live: AtomicBool::new(true),
        }));
    }

    #[inline]
    pub fn is_assigned(&self) -> bool {
        self.core.is_some()
    }

    /// Loop this timer is bound to, `LoopId::NONE` before `assign`
    #[inline]
    pub fn owner(&self) -> LoopId {
        self.owner
    }

    /// Arm the timer to fire once after `delay`. Re-activating an armed
    /// timer moves its deadline.
    ///
    /// # Panics
    ///
    /// Panics if the timer was never assigned or belongs to another loop.
    pub fn activate(&mut self, ctx: &mut LoopContext<'_>, delay: Duration) {
        self.check_owner(ctx);
        let Some(core) = &self.core else {
            panic!("Timer::activate called before assign");
        };

        if let Some(handle) = self.armed.take() {
            ctx.timers().cancel(handle);
        }

        let core = Arc::clone(core);
        let handle = ctx.timers().schedule(delay, move |ctx| {
            if core.live.load(Ordering::Acquire) {
                let mut callback = core.callback.lock().unwrap_or_else(PoisonError::into_inner);
                (*callback)(ctx);
            }
        });
        self.armed = Some(handle);
    }

    /// Disarm. Returns true if a pending firing was removed.
    pub fn cancel(&mut self, ctx: &mut LoopContext<'_>) -> bool {
        match self.armed.take() {
            Some(handle) => {
                self.check_owner(ctx);
                ctx.timers().cancel(handle)
            }
            None => false,
        }
    }

    /// Whether the timer is armed and has not fired yet
    pub fn is_active(&self, ctx: &LoopContext<'_>) -> bool {
        ctx.loop_id() == self.owner && self.armed.is_some_and(|h| ctx.timers_ref().is_pending(h))
    }

    fn check_owner(&self, ctx: &LoopContext<'_>) {
        assert!(
            self.owner == ctx.loop_id(),
            "timer bound to loop {} used from loop {}",
            self.owner,
            ctx.loop_id()
        );
    }

    fn retire(&mut self) {
        if let Some(core) = self.core.take() {
            core.live.store(false, Ordering::Release);
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.retire();
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("owner", &self.owner)
            .field("assigned", &self.core.is_some())
            .field("armed", &self.armed)
            .finish()
    }
}
