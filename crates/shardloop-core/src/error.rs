//! Error types for the dispatch engine
//!
//! Routine backpressure (`PostError`) is returned, never panicked on.
//! Construction-time problems surface as `ConfigError` / `SpawnError`.

use core::fmt;

use crate::status::ErrorCode;

/// Why a mailbox refused a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Mailbox is at capacity
    Full,
    /// Mailbox is closed: the loop (or its processor) is shutting down
    Closed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Full => write!(f, "queue full"),
            RejectReason::Closed => write!(f, "queue closed"),
        }
    }
}

/// A rejected submission. The request is handed back to the caller.
///
/// Mirrors a channel's `TrySendError<T>`: ownership only moves into the
/// mailbox on success.
#[derive(thiserror::Error)]
#[error("request not posted: {reason} ({})", .code.name())]
pub struct PostError<T> {
    request: T,
    reason: RejectReason,
    code: ErrorCode,
}

impl<T> PostError<T> {
    /// Non-blocking post hit a full mailbox
    pub fn full(request: T) -> Self {
        Self {
            request,
            reason: RejectReason::Full,
            code: ErrorCode::NoBufs,
        }
    }

    /// Non-blocking post hit a closed mailbox. Reported as `NoBufs`, the
    /// same as a full one: the loop cannot accept right now.
    pub fn closed(request: T) -> Self {
        Self {
            request,
            reason: RejectReason::Closed,
            code: ErrorCode::NoBufs,
        }
    }

    /// Blocking post gave up because the loop is shutting down
    pub fn shutdown(request: T) -> Self {
        Self {
            request,
            reason: RejectReason::Closed,
            code: ErrorCode::Shutdown,
        }
    }

    #[inline]
    pub fn reason(&self) -> RejectReason {
        self.reason
    }

    #[inline]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    #[inline]
    pub fn request(&self) -> &T {
        &self.request
    }

    /// Take the request back
    #[inline]
    pub fn into_request(self) -> T {
        self.request
    }

    /// Re-wrap with a different payload, keeping reason and code
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PostError<U> {
        PostError {
            request: f(self.request),
            reason: self.reason,
            code: self.code,
        }
    }
}

impl<T> fmt::Debug for PostError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostError")
            .field("reason", &self.reason)
            .field("code", &self.code)
            .finish_non_exhaustive()
    }
}

/// Invalid engine configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("num_workers must be > 0")]
    ZeroWorkers,

    #[error("num_workers {requested} exceeds maximum {max}")]
    TooManyWorkers { requested: usize, max: usize },

    #[error("queue capacity must be > 0")]
    ZeroCapacity,

    #[error("queue capacity {requested} exceeds maximum {max}")]
    CapacityTooLarge { requested: usize, max: usize },

    #[error("requests_per_iteration must be > 0")]
    ZeroRequestsPerIteration,

    #[error("shutdown_drain_passes must be > 0")]
    ZeroDrainPasses,

    #[error("idle_poll_interval must be > 0")]
    ZeroIdlePollInterval,

    #[error("unknown routing policy {0:?} (expected round-robin or least-loaded)")]
    UnknownRouting(String),
}

impl ConfigError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::InvalidParam
    }
}

/// Failure to start a loop thread
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("event loop already started")]
    AlreadyStarted,

    #[error("failed to spawn loop thread: {0}")]
    Os(#[from] std::io::Error),
}

impl SpawnError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SpawnError::AlreadyStarted => ErrorCode::InvalidParam,
            SpawnError::Os(_) => ErrorCode::SysLimit,
        }
    }
}

/// Failure to construct a processor
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("invalid processor settings: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to start worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: SpawnError,
    },
}

impl ProcessorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ProcessorError::Config(e) => e.code(),
            ProcessorError::Spawn { source, .. } => source.code(),
        }
    }
}
