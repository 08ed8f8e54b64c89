//! Execution hooks
//!
//! An `ExecutionObserver` sees every request invocation on the loops it
//! is installed on. It runs on the loop thread, inline with the request,
//! so it must be cheap.

use std::thread::ThreadId;

use shardloop_core::{Execution, LoopId, RequestType, WorkerId};

/// What is about to run (or just ran), and where
#[derive(Debug, Clone, Copy)]
pub struct ExecutionEvent<'a> {
    pub loop_id: LoopId,
    pub loop_name: &'a str,
    /// `None` for standalone loops
    pub worker: Option<WorkerId>,
    pub thread: ThreadId,
    pub native_thread: u64,
    pub request_type: RequestType,
}

pub trait ExecutionObserver: Send + Sync {
    fn before_execute(&self, _event: &ExecutionEvent<'_>) {}

    fn after_execute(&self, _event: &ExecutionEvent<'_>, _outcome: Execution) {}
}

/// Observer built from a closure called after each execution
pub struct FnObserver<F>(pub F);

impl<F> ExecutionObserver for FnObserver<F>
where
    F: Fn(&ExecutionEvent<'_>, Execution) + Send + Sync,
{
    fn after_execute(&self, event: &ExecutionEvent<'_>, outcome: Execution) {
        (self.0)(event, outcome)
    }
}
