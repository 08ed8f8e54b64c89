//! BinaryHeap-based per-loop timer queue
//!
//! # Complexity
//!
//! - Schedule: O(log n)
//! - Cancel: O(1) (lazy cancellation)
//! - Pop expired: O(k log n) where k = number of expired timers
//! - Next deadline: O(1) amortized
//!
//! # Cancellation Strategy
//!
//! Live handles are tracked in a HashSet. Cancelling removes the handle
//! from the set; the heap entry stays put and is skipped when it reaches
//! the top. The heap is cleared outright once no handle is live.
//!
//! The queue belongs to one loop and is only touched from that loop's
//! thread, so there is no lock.

use std::collections::{BinaryHeap, HashSet};
use std::time::{Duration, Instant};

use super::entry::{TimerEntry, TimerHandle, TimerKind};
use crate::context::LoopContext;

/// Wrapper for heap ordering (min-heap by deadline)
struct HeapEntry(TimerEntry);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.deadline == other.0.deadline && self.0.seq == other.0.seq
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse ordering for min-heap (earliest deadline first),
        // insertion order among equal deadlines
        match other.0.deadline.cmp(&self.0.deadline) {
            std::cmp::Ordering::Equal => other.0.seq.cmp(&self.0.seq),
            ord => ord,
        }
    }
}

/// Statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerQueueStats {
    /// Timers that will still fire
    pub pending: usize,
    /// Heap entries, including cancelled ones not yet skipped
    pub heap_len: usize,
    pub total_scheduled: u64,
    pub total_fired: u64,
    pub total_cancelled: u64,
}

/// Timers owned by one event loop.
///
/// Reached from request and timer callbacks through
/// `LoopContext::timers()`. Callbacks run on the loop thread.
pub struct TimerQueue {
    heap: BinaryHeap<HeapEntry>,
    pending: HashSet<TimerHandle>,
    next_seq: u64,
    total_scheduled: u64,
    total_fired: u64,
    total_cancelled: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            pending: HashSet::with_capacity(capacity),
            next_seq: 0,
            total_scheduled: 0,
            total_fired: 0,
            total_cancelled: 0,
        }
    }

    /// Fire `callback` once, `delay` from now
    pub fn schedule<F>(&mut self, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnMut(&mut LoopContext<'_>) + Send + 'static,
    {
        self.insert(Instant::now() + delay, TimerKind::OneShot, Box::new(callback))
    }

    /// Fire `callback` once at `deadline` (immediately if it has passed)
    pub fn schedule_at<F>(&mut self, deadline: Instant, callback: F) -> TimerHandle
    where
        F: FnMut(&mut LoopContext<'_>) + Send + 'static,
    {
        self.insert(deadline, TimerKind::OneShot, Box::new(callback))
    }

    /// Fire `callback` every `interval` until cancelled.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn schedule_periodic<F>(&mut self, interval: Duration, callback: F) -> TimerHandle
    where
        F: FnMut(&mut LoopContext<'_>) + Send + 'static,
    {
        assert!(!interval.is_zero(), "periodic timer interval must be non-zero");
        self.insert(Instant::now() + interval, TimerKind::Periodic { interval }, Box::new(callback))
    }

    fn insert(
        &mut self,
        deadline: Instant,
        kind: TimerKind,
        callback: super::TimerCallback,
    ) -> TimerHandle {
        let handle = TimerHandle::new();
        let seq = self.bump_seq();
        self.heap.push(HeapEntry(TimerEntry {
            handle,
            deadline,
            seq,
            kind,
            callback,
        }));
        self.pending.insert(handle);
        self.total_scheduled += 1;
        handle
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Cancel a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let removed = self.pending.remove(&handle);
        if removed {
            self.total_cancelled += 1;
            if self.pending.is_empty() {
                self.heap.clear();
            }
        }
        removed
    }

    /// Whether `handle` will still fire
    #[inline]
    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.pending.contains(&handle)
    }

    /// Number of timers that will still fire
    #[inline]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Earliest live deadline. Drops cancelled entries off the top.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(top) = self.heap.peek() {
            if self.pending.contains(&top.0.handle) {
                return Some(top.0.deadline);
            }
            self.heap.pop();
        }
        None
    }

    pub fn stats(&self) -> TimerQueueStats {
        TimerQueueStats {
            pending: self.pending.len(),
            heap_len: self.heap.len(),
            total_scheduled: self.total_scheduled,
            total_fired: self.total_fired,
            total_cancelled: self.total_cancelled,
        }
    }

    /// Remove every live entry due at `now`, earliest first
    pub(crate) fn pop_expired(&mut self, now: Instant) -> Vec<TimerEntry> {
        let mut expired = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.0.deadline > now {
                break;
            }
            if let Some(HeapEntry(entry)) = self.heap.pop() {
                if self.pending.contains(&entry.handle) {
                    expired.push(entry);
                }
            }
        }
        expired
    }

    /// Called right before firing `entry`. Returns false if an earlier
    /// callback in the same batch cancelled it. One-shot timers stop
    /// being pending here, so their callback may re-arm freely.
    pub(crate) fn claim(&mut self, entry: &TimerEntry) -> bool {
        if !self.pending.contains(&entry.handle) {
            return false;
        }
        if !entry.kind.is_periodic() {
            self.pending.remove(&entry.handle);
        }
        self.total_fired += 1;
        true
    }

    /// Put a fired periodic entry back unless its callback cancelled it
    pub(crate) fn rearm(&mut self, mut entry: TimerEntry, now: Instant) {
        if self.pending.contains(&entry.handle) && entry.reschedule(now) {
            entry.seq = self.bump_seq();
            self.heap.push(HeapEntry(entry));
        }
    }

    /// Drop everything. Returns how many live timers were discarded.
    pub(crate) fn clear(&mut self) -> usize {
        let live = self.pending.len();
        self.pending.clear();
        self.heap.clear();
        live
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerQueue").field("stats", &self.stats()).finish()
    }
}
