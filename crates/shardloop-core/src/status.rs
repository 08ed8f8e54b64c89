//! Error codes and the last-error slot
//!
//! Failed submissions return a `PostError`, which is the primary channel.
//! The same code is also stored in a per-thread slot so that callers
//! written in the check-the-code-after-the-call style keep working:
//!
//! ```ignore
//! if processor.post_request(req).is_err() {
//!     assert_eq!(last_error(), ErrorCode::NoBufs);
//! }
//! ```
//!
//! The slot is overwritten by the next failing engine call on the same
//! thread, so read it immediately.

use core::fmt;
use std::cell::Cell;

/// Engine status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    /// No error recorded
    Ok = 0,
    /// Mailbox full, or closed for shutdown
    NoBufs = 1,
    /// Loop is shutting down (blocking submission)
    Shutdown = 2,
    /// Invalid argument or configuration
    InvalidParam = 3,
    /// Thread could not be created
    SysLimit = 4,
}

impl ErrorCode {
    /// Short upper-case name, e.g. `NOBUFS`
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::Ok => "OK",
            ErrorCode::NoBufs => "NOBUFS",
            ErrorCode::Shutdown => "SHUTDOWN",
            ErrorCode::InvalidParam => "INVALID_PARAM",
            ErrorCode::SysLimit => "SYSLIMIT",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::Ok => "no error",
            ErrorCode::NoBufs => "request queue is full or closed",
            ErrorCode::Shutdown => "event loop is shutting down",
            ErrorCode::InvalidParam => "invalid parameter",
            ErrorCode::SysLimit => "system limit reached",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.description())
    }
}

thread_local! {
    static LAST_ERROR: Cell<ErrorCode> = const { Cell::new(ErrorCode::Ok) };
}

/// Code stored by the most recent failing engine call on this thread
#[inline]
pub fn last_error() -> ErrorCode {
    LAST_ERROR.with(|cell| cell.get())
}

#[inline]
pub fn set_last_error(code: ErrorCode) {
    LAST_ERROR.with(|cell| cell.set(code));
}

#[inline]
pub fn clear_last_error() {
    set_last_error(ErrorCode::Ok);
}
