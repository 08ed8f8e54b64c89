//! # shardloop-runtime
//!
//! Threads, mailboxes and timers for the shardloop dispatch engine.
//!
//! ## Architecture
//!
//! ```text
//!   Processor ──post_request(req)──► affinity / RoutingPolicy
//!       │                                   │
//!       │ owns                              ▼
//!       ├── Worker 0 ── EventLoopHandle ── Mailbox (bounded) ──► loop thread
//!       ├── Worker 1 ── EventLoopHandle ── Mailbox (bounded) ──► loop thread
//!       └── ...                                                   │
//!                                                                 ▼
//!                                        timers → deferred → mailbox batch
//! ```
//!
//! ## Modules
//!
//! - `config` - processor settings with env overrides
//! - `request` - the `Request` trait and closure adapters
//! - `context` - `LoopContext`, the executing request's view of its loop
//! - `event_loop` / `handle` - a single loop thread and its owner
//! - `worker` / `processor` - sharded loops behind one posting API
//! - `routing` - placement of `ThreadAffinity::Any` requests
//! - `timer` - per-loop timer queue and the reusable `Timer`
//! - `observer` - execution hooks
//! - `parking` - platform-specific loop sleep/wake
//! - `tls` - thread-local loop context

pub mod config;
pub mod context;
pub mod event_loop;
pub mod handle;
mod mailbox;
pub mod observer;
pub mod parking;
pub mod processor;
pub mod request;
pub mod routing;
pub mod stats;
pub mod timer;
pub mod tls;
pub mod worker;

pub use config::ProcessorSettings;
pub use context::LoopContext;
pub use event_loop::EventLoop;
pub use handle::{EventLoopHandle, LoopRef};
pub use observer::{ExecutionEvent, ExecutionObserver, FnObserver};
pub use processor::{Processor, ProcessorBuilder, ProcessorRef};
pub use request::{request_fn, BoxedRequest, FnRequest, OnceRequest, PostResult, Request};
pub use routing::{LeastLoaded, RoundRobin, RoutingKind, RoutingPolicy};
pub use stats::LoopStats;
pub use timer::{Timer, TimerHandle, TimerKind, TimerQueue, TimerQueueStats};
pub use worker::Worker;
