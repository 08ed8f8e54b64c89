//! Fallback parking using std::sync::Condvar
//!
//! Used on platforms without futex support.

use super::LoopParking;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

pub struct FallbackParking {
    /// `true` = token pending
    token: Mutex<bool>,
    condvar: Condvar,
    parked: AtomicBool,
}

impl FallbackParking {
    pub fn new() -> Self {
        Self {
            token: Mutex::new(false),
            condvar: Condvar::new(),
            parked: AtomicBool::new(false),
        }
    }
}

impl Default for FallbackParking {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopParking for FallbackParking {
    fn park(&self, timeout: Option<Duration>) -> bool {
        let mut guard = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if !*guard {
            self.parked.store(true, Ordering::Relaxed);
            guard = match timeout {
                Some(t) => {
                    self.condvar
                        .wait_timeout_while(guard, t, |token| !*token)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .condvar
                    .wait_while(guard, |token| !*token)
                    .unwrap_or_else(PoisonError::into_inner),
            };
            self.parked.store(false, Ordering::Relaxed);
        }
        std::mem::replace(&mut *guard, false)
    }

    fn unpark(&self) {
        let mut guard = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if !*guard {
            *guard = true;
            self.condvar.notify_one();
        }
    }

    fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Relaxed)
    }
}
