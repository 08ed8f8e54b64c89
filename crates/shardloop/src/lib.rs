//! # shardloop - sharded event-loop dispatch
//!
//! A `Processor` owns a fixed set of worker threads, each running an
//! event loop with a bounded mailbox. Callers post `Request`s; each
//! request runs on the worker its `ThreadAffinity` names, or on one the
//! routing policy picks. Loops never block on a full peer: a non-blocking
//! post to a full mailbox fails with `NOBUFS` and hands the request back.
//!
//! ## Quick Start
//!
//! ```ignore
//! use shardloop::prelude::*;
//!
//! struct Append { log_id: usize, payload: Vec<u8> }
//!
//! impl Request for Append {
//!     fn execute(&mut self, ctx: &mut LoopContext<'_>) -> Execution {
//!         tracing::debug!(worker = ?ctx.worker_id(), log_id = self.log_id, "append");
//!         Execution::Complete
//!     }
//!
//!     fn thread_affinity(&self, num_workers: usize) -> ThreadAffinity {
//!         ThreadAffinity::worker(self.log_id % num_workers)
//!     }
//! }
//!
//! let processor = Processor::new(ProcessorSettings::from_env())?;
//! if let Err(err) = processor.post_request(Box::new(Append { log_id: 7, payload: vec![] })) {
//!     // Backpressure: the request comes back inside the error.
//!     let request = err.into_request();
//! }
//! drop(processor); // stops, drains and joins every worker
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Code                              │
//! │        post_request(), blocking_request(), Timer            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Processor                              │
//! │         affinity / routing policy, shutdown sequence        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │  Worker 0 │      │  Worker 1 │      │  Worker N │
//!    │ mailbox + │      │ mailbox + │      │ mailbox + │
//!    │ loop + tq │      │ loop + tq │      │ loop + tq │
//!    └───────────┘      └───────────┘      └───────────┘
//! ```

pub use shardloop_core::{
    clear_last_error, last_error, set_last_error, ConfigError, ErrorCode, Execution, LoopId,
    PostError, ProcessorError, RejectReason, RequestType, SpawnError, ThreadAffinity, WorkerId,
};
pub use shardloop_core::{constants, env};

pub use shardloop_runtime::{
    config, observer, routing, timer, tls, EventLoop, EventLoopHandle, ExecutionEvent,
    ExecutionObserver, FnObserver, FnRequest, LoopContext, LoopRef, LoopStats, OnceRequest,
    PostResult, Processor, ProcessorBuilder, ProcessorRef, ProcessorSettings, Request,
    RoutingKind, RoutingPolicy, Timer, TimerHandle, TimerQueue, Worker,
};
pub use shardloop_runtime::{request_fn, BoxedRequest};

/// Everything a typical request implementation needs
pub mod prelude {
    pub use crate::{
        request_fn, BoxedRequest, ErrorCode, EventLoop, EventLoopHandle, Execution, FnRequest,
        LoopContext, PostError, PostResult, Processor, ProcessorSettings, Request, RequestType,
        ThreadAffinity, Timer, WorkerId,
    };
}
