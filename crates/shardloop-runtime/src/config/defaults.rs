//! Compiled-in defaults for `ProcessorSettings`

use shardloop_core::constants::MAX_WORKERS;

/// Per-worker mailbox capacity
pub const QUEUE_CAPACITY: usize = 1024;

/// Mailbox requests executed per loop iteration before timers get a turn
pub const REQUESTS_PER_ITERATION: usize = 16;

/// Bounded drain passes a stopping loop makes over its mailbox
pub const SHUTDOWN_DRAIN_PASSES: usize = 2;

/// Longest an idle loop sleeps without a post or timer waking it
pub const IDLE_POLL_MS: u64 = 100;

/// Pause between re-invocations when a loop has only `Continue` requests
/// to run
pub const CONTINUE_BACKOFF_US: u64 = 200;

pub const THREAD_NAME_PREFIX: &str = "shardloop-worker";

/// One worker per available CPU, capped at `MAX_WORKERS`
pub fn num_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(MAX_WORKERS)
}
