//! Spreading `ThreadAffinity::Any` requests across workers

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Picks a worker for a request that can run anywhere.
///
/// `load(i)` returns the current mailbox length of worker `i`. It is a
/// racy snapshot; policies only use it as a hint.
pub trait RoutingPolicy: Send + Sync {
    fn select(&self, num_workers: usize, load: &dyn Fn(usize) -> usize) -> usize;

    fn name(&self) -> &'static str;
}

/// Cycle through workers in order
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoutingPolicy for RoundRobin {
    fn select(&self, num_workers: usize, _load: &dyn Fn(usize) -> usize) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % num_workers
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}

/// Worker with the shortest mailbox. Ties go to the lowest index at or
/// after a rotating start, so an idle processor still spreads work.
#[derive(Debug, Default)]
pub struct LeastLoaded {
    start: AtomicUsize,
}

impl LeastLoaded {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoutingPolicy for LeastLoaded {
    fn select(&self, num_workers: usize, load: &dyn Fn(usize) -> usize) -> usize {
        let start = self.start.fetch_add(1, Ordering::Relaxed) % num_workers;
        let mut best = start;
        let mut best_load = load(start);
        for offset in 1..num_workers {
            if best_load == 0 {
                break;
            }
            let idx = (start + offset) % num_workers;
            let l = load(idx);
            if l < best_load {
                best = idx;
                best_load = l;
            }
        }
        best
    }

    fn name(&self) -> &'static str {
        "least-loaded"
    }
}

/// Routing policy named in settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RoutingKind {
    #[default]
    RoundRobin,
    LeastLoaded,
    /// Unrecognised name from the environment, rejected by `validate()`
    Unknown(String),
}

impl RoutingKind {
    /// Instantiate the policy. `Unknown` falls back to round-robin.
    pub fn build(&self) -> Box<dyn RoutingPolicy> {
        match self {
            RoutingKind::LeastLoaded => Box::new(LeastLoaded::new()),
            RoutingKind::RoundRobin | RoutingKind::Unknown(_) => Box::new(RoundRobin::new()),
        }
    }
}

impl FromStr for RoutingKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round-robin" | "round_robin" | "rr" => Ok(RoutingKind::RoundRobin),
            "least-loaded" | "least_loaded" => Ok(RoutingKind::LeastLoaded),
            _ => Err(()),
        }
    }
}

impl fmt::Display for RoutingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingKind::RoundRobin => f.write_str("round-robin"),
            RoutingKind::LeastLoaded => f.write_str("least-loaded"),
            RoutingKind::Unknown(name) => write!(f, "unknown({name})"),
        }
    }
}
