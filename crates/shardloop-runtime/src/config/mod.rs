//! Processor settings
//!
//! Compiled-in defaults with `SHARDLOOP_*` environment overrides.
//!
//! # Configuration priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables (only via `from_env()`)
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use shardloop_runtime::config::ProcessorSettings;
//!
//! let settings = ProcessorSettings::from_env()
//!     .num_workers(4)
//!     .queue_capacity(256);
//! settings.validate()?;
//! ```

pub mod defaults;

use std::time::Duration;

use shardloop_core::constants::{MAX_QUEUE_CAPACITY, MAX_WORKERS};
use shardloop_core::env::{env_get, env_get_opt, env_get_str};
use shardloop_core::ConfigError;

use crate::routing::RoutingKind;

/// Settings for a `Processor` and the loops it owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorSettings {
    /// Number of worker loops
    pub num_workers: usize,
    /// Mailbox capacity of each worker
    pub queue_capacity: usize,
    /// Mailbox requests handled per loop iteration
    pub requests_per_iteration: usize,
    /// Bounded passes over the mailbox when a loop stops
    pub shutdown_drain_passes: usize,
    /// Longest idle park between iterations
    pub idle_poll_interval: Duration,
    /// Policy for requests with `ThreadAffinity::Any`
    pub routing: RoutingKind,
    /// Loop threads are named `{prefix}-{index}`
    pub thread_name_prefix: String,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ProcessorSettings {
    /// Defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `SHARDLOOP_NUM_WORKERS` - Number of worker loops
    /// - `SHARDLOOP_QUEUE_CAPACITY` - Per-worker mailbox capacity
    /// - `SHARDLOOP_REQUESTS_PER_ITERATION` - Batch size per loop iteration
    /// - `SHARDLOOP_SHUTDOWN_DRAIN_PASSES` - Drain passes on stop
    /// - `SHARDLOOP_IDLE_POLL_MS` - Idle park timeout in milliseconds
    /// - `SHARDLOOP_ROUTING` - `round-robin` or `least-loaded`
    /// - `SHARDLOOP_THREAD_PREFIX` - Loop thread name prefix
    ///
    /// An unrecognised `SHARDLOOP_ROUTING` value is kept as
    /// `RoutingKind::Unknown` so that `validate()` reports it.
    pub fn from_env() -> Self {
        let routing = env_get_opt::<String>("SHARDLOOP_ROUTING")
            .map(|s| s.parse().unwrap_or(RoutingKind::Unknown(s)))
            .unwrap_or_default();

        Self {
            num_workers: env_get("SHARDLOOP_NUM_WORKERS", defaults::num_workers()),
            queue_capacity: env_get("SHARDLOOP_QUEUE_CAPACITY", defaults::QUEUE_CAPACITY),
            requests_per_iteration: env_get(
                "SHARDLOOP_REQUESTS_PER_ITERATION",
                defaults::REQUESTS_PER_ITERATION,
            ),
            shutdown_drain_passes: env_get(
                "SHARDLOOP_SHUTDOWN_DRAIN_PASSES",
                defaults::SHUTDOWN_DRAIN_PASSES,
            ),
            idle_poll_interval: Duration::from_millis(env_get(
                "SHARDLOOP_IDLE_POLL_MS",
                defaults::IDLE_POLL_MS,
            )),
            routing,
            thread_name_prefix: env_get_str(
                "SHARDLOOP_THREAD_PREFIX",
                defaults::THREAD_NAME_PREFIX,
            ),
        }
    }

    /// Library defaults only, ignoring the environment.
    /// Useful for tests that must not be affected by the caller's shell.
    pub fn new() -> Self {
        Self {
            num_workers: defaults::num_workers(),
            queue_capacity: defaults::QUEUE_CAPACITY,
            requests_per_iteration: defaults::REQUESTS_PER_ITERATION,
            shutdown_drain_passes: defaults::SHUTDOWN_DRAIN_PASSES,
            idle_poll_interval: Duration::from_millis(defaults::IDLE_POLL_MS),
            routing: RoutingKind::default(),
            thread_name_prefix: defaults::THREAD_NAME_PREFIX.to_string(),
        }
    }

    // Builder methods

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn queue_capacity(mut self, cap: usize) -> Self {
        self.queue_capacity = cap;
        self
    }

    pub fn requests_per_iteration(mut self, n: usize) -> Self {
        self.requests_per_iteration = n;
        self
    }

    pub fn shutdown_drain_passes(mut self, n: usize) -> Self {
        self.shutdown_drain_passes = n;
        self
    }

    pub fn idle_poll_interval(mut self, d: Duration) -> Self {
        self.idle_poll_interval = d;
        self
    }

    pub fn routing(mut self, routing: RoutingKind) -> Self {
        self.routing = routing;
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Validate settings and return the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.num_workers > MAX_WORKERS {
            return Err(ConfigError::TooManyWorkers {
                requested: self.num_workers,
                max: MAX_WORKERS,
            });
        }
        validate_queue(self.queue_capacity, self.requests_per_iteration)?;
        if self.shutdown_drain_passes == 0 {
            return Err(ConfigError::ZeroDrainPasses);
        }
        if self.idle_poll_interval.is_zero() {
            return Err(ConfigError::ZeroIdlePollInterval);
        }
        if let RoutingKind::Unknown(name) = &self.routing {
            return Err(ConfigError::UnknownRouting(name.clone()));
        }
        Ok(())
    }

    /// Name of the loop thread for worker `index`
    pub fn thread_name(&self, index: usize) -> String {
        format!("{}-{}", self.thread_name_prefix, index)
    }
}

/// Checks shared by `ProcessorSettings` and standalone `EventLoopHandle`s
pub(crate) fn validate_queue(
    capacity: usize,
    requests_per_iteration: usize,
) -> Result<(), ConfigError> {
    if capacity == 0 {
        return Err(ConfigError::ZeroCapacity);
    }
    if capacity > MAX_QUEUE_CAPACITY {
        return Err(ConfigError::CapacityTooLarge {
            requested: capacity,
            max: MAX_QUEUE_CAPACITY,
        });
    }
    if requests_per_iteration == 0 {
        return Err(ConfigError::ZeroRequestsPerIteration);
    }
    Ok(())
}
