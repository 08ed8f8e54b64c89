//! Request execution status and type tags

use core::fmt;

/// What a request tells its loop after `execute` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Execution {
    /// Done. The loop drops the request.
    Complete,
    /// Not done. The loop keeps the request and invokes it again on a
    /// later iteration, on the same thread.
    Continue,
}

impl Execution {
    #[inline]
    pub fn is_complete(self) -> bool {
        matches!(self, Execution::Complete)
    }
}

/// Diagnostic tag identifying a request's kind.
///
/// The set is open: subsystems define their own constants.
///
/// ```ignore
/// const APPEND: RequestType = RequestType::new("APPEND");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestType(&'static str);

impl RequestType {
    pub const UNSPECIFIED: RequestType = RequestType("UNSPECIFIED");
    /// Closure-backed requests built by `FnRequest`
    pub const CLOSURE: RequestType = RequestType("CLOSURE");

    #[inline]
    pub const fn new(name: &'static str) -> Self {
        RequestType(name)
    }

    #[inline]
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl Default for RequestType {
    fn default() -> Self {
        RequestType::UNSPECIFIED
    }
}

impl fmt::Debug for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestType({})", self.0)
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}
