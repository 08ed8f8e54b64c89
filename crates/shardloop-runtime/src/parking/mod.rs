//! Loop parking
//!
//! An idle event loop sleeps until a producer posts, a timer comes due, or
//! the idle poll interval passes. There is exactly one parker per instance
//! (the loop thread) and any number of unparkers (producers).
//!
//! `unpark()` leaves a token behind when the loop is not parked, so a post
//! that lands between the loop's last pop and its `park()` is never missed.

use std::time::Duration;

/// Platform-specific single-consumer parking
pub trait LoopParking: Send + Sync {
    /// Park the loop thread until unparked or `timeout` elapses.
    ///
    /// Returns `true` if a token was consumed. Callers re-check their
    /// queues regardless of the return value.
    fn park(&self, timeout: Option<Duration>) -> bool;

    /// Leave a token and wake the parked loop, if any
    fn unpark(&self);

    /// Whether the loop is currently parked (hint, may be stale)
    fn is_parked(&self) -> bool;
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParking as PlatformParking;
    } else {
        mod fallback;
        pub use fallback::FallbackParking as PlatformParking;
    }
}

/// Create a new platform-appropriate parking instance
pub fn new_parking() -> Box<dyn LoopParking> {
    Box::new(PlatformParking::new())
}
