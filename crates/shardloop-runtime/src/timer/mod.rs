//! Timers that fire on an event loop
//!
//! Every loop owns a `TimerQueue`. Callbacks scheduled on it run on that
//! loop's thread, between batches of requests, and receive the same
//! `LoopContext` a request does.
//!
//! ```text
//!   request.execute(ctx) ──ctx.timers().schedule(..)──► TimerQueue (heap)
//!                                                             │
//!   loop iteration: fire_timers() ◄──pop_expired(now)─────────┘
//!                        │
//!                        ▼
//!                callback(&mut LoopContext)
//! ```
//!
//! `Timer` wraps a reusable callback with assign / activate / cancel on
//! top of the queue.

mod entry;
mod queue;
#[allow(clippy::module_inception)]
mod timer;

pub use entry::{TimerCallback, TimerHandle, TimerKind};
pub(crate) use entry::TimerEntry;
pub use queue::{TimerQueue, TimerQueueStats};
pub use timer::Timer;
