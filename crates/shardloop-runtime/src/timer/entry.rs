//! Timer entry and handle types

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::context::LoopContext;

/// Globally unique timer handle for cancellation
///
/// A periodic timer keeps its handle across firings, so the handle
/// returned by `schedule_periodic` cancels every future firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    #[inline]
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        TimerHandle(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw handle value (for debugging/logging)
    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Firing behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fire once, then forget
    OneShot,

    /// Fire every `interval` until cancelled
    Periodic {
        interval: Duration,
    },
}

impl TimerKind {
    #[inline]
    pub fn is_periodic(&self) -> bool {
        matches!(self, TimerKind::Periodic { .. })
    }
}

/// Callback run on the owning loop's thread when a timer fires
pub type TimerCallback = Box<dyn FnMut(&mut LoopContext<'_>) + Send>;

/// Timer entry stored in a `TimerQueue`
pub(crate) struct TimerEntry {
    pub(crate) handle: TimerHandle,
    pub(crate) deadline: Instant,
    /// Insertion order, tie-break for equal deadlines
    pub(crate) seq: u64,
    pub(crate) kind: TimerKind,
    pub(crate) callback: TimerCallback,
}

impl TimerEntry {
    /// Move a fired periodic entry to its next deadline.
    ///
    /// A loop that fell more than one interval behind skips the missed
    /// firings instead of bursting through them.
    pub(crate) fn reschedule(&mut self, now: Instant) -> bool {
        match self.kind {
            TimerKind::Periodic { interval } => {
                let next = self.deadline + interval;
                self.deadline = if next <= now { now + interval } else { next };
                true
            }
            TimerKind::OneShot => false,
        }
    }
}

impl fmt::Debug for TimerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerEntry")
            .field("handle", &self.handle)
            .field("deadline", &self.deadline)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
