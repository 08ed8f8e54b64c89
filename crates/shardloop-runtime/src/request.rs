//! The unit of work executed by an event loop

use std::fmt;

use shardloop_core::{Execution, PostError, RequestType, ThreadAffinity};

use crate::context::LoopContext;

/// A request posted to an event loop or processor.
///
/// The loop owns the request from a successful post until it is
/// dropped: after `execute` returns `Complete`, or unexecuted when the
/// loop stops with requests still queued.
///
/// # Example
///
/// ```ignore
/// struct Append { payload: Vec<u8> }
///
/// impl Request for Append {
///     fn execute(&mut self, ctx: &mut LoopContext<'_>) -> Execution {
///         tracing::debug!(worker = ?ctx.worker_id(), len = self.payload.len(), "append");
///         Execution::Complete
///     }
///
///     fn thread_affinity(&self, num_workers: usize) -> ThreadAffinity {
///         ThreadAffinity::worker(self.payload.len() % num_workers)
///     }
/// }
/// ```
pub trait Request: Send + 'static {
    /// Run on the loop thread. Return `Continue` to be invoked again on a
    /// later iteration.
    fn execute(&mut self, ctx: &mut LoopContext<'_>) -> Execution;

    /// Which worker of a `Processor` must run this request. Consulted once
    /// per `Processor::post_request`; ignored by a standalone loop.
    fn thread_affinity(&self, _num_workers: usize) -> ThreadAffinity {
        ThreadAffinity::Any
    }

    /// Tag used in logs and observer events
    fn request_type(&self) -> RequestType {
        RequestType::UNSPECIFIED
    }
}

pub type BoxedRequest = Box<dyn Request>;

/// Outcome of a post; the error hands the request back
pub type PostResult = Result<(), PostError<BoxedRequest>>;

impl fmt::Debug for dyn Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request").field("type", &self.request_type()).finish_non_exhaustive()
    }
}

/// Request backed by a closure that may run several times
pub struct FnRequest<F> {
    f: F,
    affinity: ThreadAffinity,
    request_type: RequestType,
}

impl<F> FnRequest<F>
where
    F: FnMut(&mut LoopContext<'_>) -> Execution + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            affinity: ThreadAffinity::Any,
            request_type: RequestType::CLOSURE,
        }
    }

    /// Pin to worker `index` when posted through a processor
    pub fn on_worker(mut self, index: usize) -> Self {
        self.affinity = ThreadAffinity::worker(index);
        self
    }

    pub fn with_type(mut self, request_type: RequestType) -> Self {
        self.request_type = request_type;
        self
    }

    pub fn boxed(self) -> BoxedRequest {
        Box::new(self)
    }
}

impl<F> Request for FnRequest<F>
where
    F: FnMut(&mut LoopContext<'_>) -> Execution + Send + 'static,
{
    fn execute(&mut self, ctx: &mut LoopContext<'_>) -> Execution {
        (self.f)(ctx)
    }

    fn thread_affinity(&self, _num_workers: usize) -> ThreadAffinity {
        self.affinity
    }

    fn request_type(&self) -> RequestType {
        self.request_type
    }
}

/// Request backed by a closure that runs exactly once
pub struct OnceRequest<F> {
    f: Option<F>,
    affinity: ThreadAffinity,
    request_type: RequestType,
}

impl<F> OnceRequest<F>
where
    F: FnOnce(&mut LoopContext<'_>) + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self {
            f: Some(f),
            affinity: ThreadAffinity::Any,
            request_type: RequestType::CLOSURE,
        }
    }

    pub fn on_worker(mut self, index: usize) -> Self {
        self.affinity = ThreadAffinity::worker(index);
        self
    }

    pub fn with_type(mut self, request_type: RequestType) -> Self {
        self.request_type = request_type;
        self
    }

    pub fn boxed(self) -> BoxedRequest {
        Box::new(self)
    }
}

impl<F> Request for OnceRequest<F>
where
    F: FnOnce(&mut LoopContext<'_>) + Send + 'static,
{
    fn execute(&mut self, ctx: &mut LoopContext<'_>) -> Execution {
        if let Some(f) = self.f.take() {
            f(ctx);
        }
        Execution::Complete
    }

    fn thread_affinity(&self, _num_workers: usize) -> ThreadAffinity {
        self.affinity
    }

    fn request_type(&self) -> RequestType {
        self.request_type
    }
}

/// Box a one-shot closure as a request
pub fn request_fn<F>(f: F) -> BoxedRequest
where
    F: FnOnce(&mut LoopContext<'_>) + Send + 'static,
{
    Box::new(OnceRequest::new(f))
}
