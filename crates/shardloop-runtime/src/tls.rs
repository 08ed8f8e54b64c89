//! Thread-local loop context
//!
//! Records which event loop the current OS thread is running. Used to
//! detect a loop posting to itself with a blocking call and a loop
//! trying to join its own thread.

use shardloop_core::LoopId;
use std::cell::Cell;

thread_local! {
    /// Loop driven by this OS thread, `LoopId::NONE` elsewhere
    static CURRENT_LOOP: Cell<u64> = const { Cell::new(0) };
}

/// Mark this thread as the one running `loop_id`
#[inline]
pub(crate) fn enter_loop(loop_id: LoopId) {
    CURRENT_LOOP.with(|cell| cell.set(loop_id.as_u64()));
}

#[inline]
pub(crate) fn leave_loop() {
    CURRENT_LOOP.with(|cell| cell.set(0));
}

/// Loop running on this thread, `LoopId::NONE` if none
#[inline]
pub fn current_loop_id() -> LoopId {
    LoopId::from_raw(CURRENT_LOOP.with(|cell| cell.get()))
}

/// Native thread id of the calling thread
#[cfg(unix)]
#[inline]
pub fn native_thread_id() -> u64 {
    nix::sys::pthread::pthread_self() as u64
}

#[cfg(not(unix))]
#[inline]
pub fn native_thread_id() -> u64 {
    0
}
