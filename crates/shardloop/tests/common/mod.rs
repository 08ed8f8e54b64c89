//! Helpers shared by the integration tests

#![allow(dead_code)]

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Counting semaphore
#[derive(Default)]
pub struct Semaphore {
    count: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.cond.notify_one();
    }

    /// Waits up to 10s; panics on timeout so a broken test fails instead
    /// of hanging
    pub fn wait(&self) {
        let guard = self.count.lock().unwrap();
        let (mut count, timeout) = self
            .cond
            .wait_timeout_while(guard, Duration::from_secs(10), |c| *c == 0)
            .unwrap();
        assert!(!timeout.timed_out(), "semaphore wait timed out");
        *count -= 1;
    }

    pub fn value(&self) -> usize {
        *self.count.lock().unwrap()
    }
}

/// Poll `cond` for up to 5s
pub fn wait_until(cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}
