//! # shardloop-core
//!
//! Core types for the shardloop dispatch engine.
//!
//! This crate is platform-agnostic and contains no threads, queues or
//! OS-specific code. All of that lives in `shardloop-runtime`.
//!
//! ## Modules
//!
//! - `id` - worker, loop and affinity identifiers
//! - `state` - request execution status and request type tags
//! - `status` - errno-style error codes and the per-thread last-error slot
//! - `error` - typed errors for configuration, spawning and posting
//! - `env` - environment variable utilities

pub mod id;
pub mod state;
pub mod status;
pub mod error;
pub mod env;

// Re-exports for convenience
pub use id::{LoopId, ThreadAffinity, WorkerId};
pub use state::{Execution, RequestType};
pub use status::{clear_last_error, last_error, set_last_error, ErrorCode};
pub use error::{ConfigError, PostError, ProcessorError, RejectReason, SpawnError};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str};

/// Engine-wide limits
pub mod constants {
    /// Maximum number of workers a single processor may own
    pub const MAX_WORKERS: usize = 128;

    /// Upper bound on a single mailbox's capacity
    pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;
}
