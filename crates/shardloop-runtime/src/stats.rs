//! Per-loop counters
//!
//! Counters are bumped with relaxed atomics from producers and the loop
//! thread; `snapshot()` gives a plain copy for reporting.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct LoopCounters {
    pub(crate) posted: AtomicU64,
    pub(crate) rejected_full: AtomicU64,
    pub(crate) rejected_closed: AtomicU64,
    pub(crate) executed: AtomicU64,
    pub(crate) continued: AtomicU64,
    pub(crate) timers_fired: AtomicU64,
    pub(crate) discarded_on_shutdown: AtomicU64,
    pub(crate) iterations: AtomicU64,
}

#[inline]
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn add(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl LoopCounters {
    pub(crate) fn snapshot(&self) -> LoopStats {
        LoopStats {
            posted: self.posted.load(Ordering::Relaxed),
            rejected_full: self.rejected_full.load(Ordering::Relaxed),
            rejected_closed: self.rejected_closed.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            continued: self.continued.load(Ordering::Relaxed),
            timers_fired: self.timers_fired.load(Ordering::Relaxed),
            discarded_on_shutdown: self.discarded_on_shutdown.load(Ordering::Relaxed),
            iterations: self.iterations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of one loop's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Requests accepted into the mailbox
    pub posted: u64,
    /// Posts refused because the mailbox was full
    pub rejected_full: u64,
    /// Posts refused because the loop was stopping
    pub rejected_closed: u64,
    /// `execute` invocations, including re-invocations
    pub executed: u64,
    /// Invocations that returned `Execution::Continue`
    pub continued: u64,
    pub timers_fired: u64,
    /// Requests dropped unexecuted when the loop stopped
    pub discarded_on_shutdown: u64,
    pub iterations: u64,
}

impl LoopStats {
    pub fn rejected(&self) -> u64 {
        self.rejected_full + self.rejected_closed
    }
}

impl std::ops::Add for LoopStats {
    type Output = LoopStats;

    fn add(self, rhs: LoopStats) -> LoopStats {
        LoopStats {
            posted: self.posted + rhs.posted,
            rejected_full: self.rejected_full + rhs.rejected_full,
            rejected_closed: self.rejected_closed + rhs.rejected_closed,
            executed: self.executed + rhs.executed,
            continued: self.continued + rhs.continued,
            timers_fired: self.timers_fired + rhs.timers_fired,
            discarded_on_shutdown: self.discarded_on_shutdown + rhs.discarded_on_shutdown,
            iterations: self.iterations + rhs.iterations,
        }
    }
}

impl std::iter::Sum for LoopStats {
    fn sum<I: Iterator<Item = LoopStats>>(iter: I) -> LoopStats {
        iter.fold(LoopStats::default(), |acc, s| acc + s)
    }
}

impl fmt::Display for LoopStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "posted={} executed={} continued={} rejected={}/{} timers={} discarded={} \
             iterations={}",
            self.posted,
            self.executed,
            self.continued,
            self.rejected_full,
            self.rejected_closed,
            self.timers_fired,
            self.discarded_on_shutdown,
            self.iterations,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let counters = LoopCounters::default();
        bump(&counters.posted);
        bump(&counters.posted);
        bump(&counters.rejected_full);
        add(&counters.discarded_on_shutdown, 5);

        let stats = counters.snapshot();
        assert_eq!(stats.posted, 2);
        assert_eq!(stats.rejected(), 1);
        assert_eq!(stats.discarded_on_shutdown, 5);
    }

    #[test]
    fn test_sum() {
        let a = LoopStats {
            executed: 3,
            ..Default::default()
        };
        let b = LoopStats {
            executed: 4,
            iterations: 1,
            ..Default::default()
        };
        let total: LoopStats = [a, b].into_iter().sum();
        assert_eq!(total.executed, 7);
        assert_eq!(total.iterations, 1);
    }
}
