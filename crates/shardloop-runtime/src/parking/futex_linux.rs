//! Linux futex-based loop parking
//!
//! Futex word semantics:
//! - 0 = no token
//! - 1 = token pending (the loop should re-check its mailbox)
//!
//! Parking consumes a pending token without sleeping. Otherwise the loop
//! marks itself parked and FUTEX_WAITs while the word is 0.
//!
//! Unparking stores the token and issues FUTEX_WAKE only if the word was
//! 0 and the loop is parked. `parked` and `futex` are both SeqCst so that
//! either the parker sees the token or the unparker sees `parked`.

use super::LoopParking;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

pub struct FutexParking {
    futex: AtomicU32,
    parked: AtomicBool,
}

impl FutexParking {
    pub fn new() -> Self {
        Self {
            futex: AtomicU32::new(0),
            parked: AtomicBool::new(false),
        }
    }

    fn futex_wait(&self, timeout: Option<Duration>) {
        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let timespec_ptr = match &timespec {
            Some(ts) => ts as *const libc::timespec,
            None => std::ptr::null(),
        };

        // ETIMEDOUT, EAGAIN (word already 1) and EINTR all just return;
        // the caller looks at the word afterwards.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                0u32,
                timespec_ptr,
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }

    fn futex_wake(&self) {
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                1i32,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }
}

impl Default for FutexParking {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopParking for FutexParking {
    fn park(&self, timeout: Option<Duration>) -> bool {
        if self.futex.swap(0, Ordering::SeqCst) == 1 {
            return true;
        }

        self.parked.store(true, Ordering::SeqCst);
        if self.futex.load(Ordering::SeqCst) == 0 {
            self.futex_wait(timeout);
        }
        self.parked.store(false, Ordering::SeqCst);

        self.futex.swap(0, Ordering::SeqCst) == 1
    }

    fn unpark(&self) {
        if self.futex.swap(1, Ordering::SeqCst) == 0 && self.parked.load(Ordering::SeqCst) {
            self.futex_wake();
        }
    }

    fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Relaxed)
    }
}
