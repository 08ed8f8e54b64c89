//! Identifiers: workers, event loops and thread affinity

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Index of a worker within its processor, in `[0, num_workers)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct WorkerId(usize);

impl WorkerId {
    #[inline]
    pub const fn new(index: usize) -> Self {
        WorkerId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }

    /// The other worker of a pair (`w ^ 1`), handy for two-worker setups.
    #[inline]
    pub const fn peer(self) -> Self {
        WorkerId(self.0 ^ 1)
    }
}

impl fmt::Debug for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkerId({})", self.0)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W{}", self.0)
    }
}

impl From<usize> for WorkerId {
    fn from(index: usize) -> Self {
        WorkerId::new(index)
    }
}

/// Where a request wants to run.
///
/// Evaluated once, when the request is posted. The request then runs on
/// the chosen worker's thread and is never re-routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThreadAffinity {
    /// Must run on this worker.
    Worker(WorkerId),
    /// Any worker will do; the processor's routing policy decides.
    Any,
}

impl ThreadAffinity {
    #[inline]
    pub const fn worker(index: usize) -> Self {
        ThreadAffinity::Worker(WorkerId::new(index))
    }

    /// Returns the pinned worker index if it is valid for `num_workers`.
    ///
    /// `Ok(None)` means `Any`. `Err(index)` carries an out-of-range index.
    #[inline]
    pub fn resolve(self, num_workers: usize) -> Result<Option<usize>, usize> {
        match self {
            ThreadAffinity::Any => Ok(None),
            ThreadAffinity::Worker(w) if w.index() < num_workers => Ok(Some(w.index())),
            ThreadAffinity::Worker(w) => Err(w.index()),
        }
    }
}

impl Default for ThreadAffinity {
    fn default() -> Self {
        ThreadAffinity::Any
    }
}

/// Process-unique identity of one event loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(u64);

impl LoopId {
    /// Sentinel: "not a loop thread".
    pub const NONE: LoopId = LoopId(0);

    /// Allocate a fresh id
    #[inline]
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        LoopId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        LoopId(raw)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}
