//! Collaborator traits that decouple the evaluator from the task/tool
//! system it drives.
//!
//! The evaluator owns no process-wide state. Atom definitions, external
//! invocations and workflow log output all go through these traits, so the
//! core can be tested with in-memory implementations.

use crate::runtime::cancellation::CancellationToken;
use crate::runtime::values::{Diagnostic, ExternalResult, Symbol, Value};
use std::fmt::Debug;

/// One delegated call: a head symbol the evaluator could not resolve, with
/// its already-evaluated arguments.
#[derive(Debug, Clone, Copy)]
pub struct InvocationRequest<'a> {
    pub callee: &'a Symbol,
    pub args: &'a [Value],
    /// Shared with the driver; long-running work should poll it.
    pub cancellation: &'a CancellationToken,
}

/// Executes external tasks and tools.
///
/// The call blocks the evaluator until it returns. A returned
/// `ExternalResult` with `succeeded == false` and an `Err` fault are both
/// surfaced to the workflow as `ExternalInvocationFailure`. The evaluator
/// never retries.
pub trait ExternalInvoker: Debug {
    fn invoke(&self, request: InvocationRequest<'_>) -> Result<ExternalResult, Diagnostic>;
}

/// Receives `(defatom name spec...)` registrations. `spec` is unevaluated.
pub trait AtomRegistry: Debug {
    fn register(&self, name: &Symbol, spec: &[Value]) -> Result<(), Diagnostic>;
}

/// Observability sink for `log-message`.
pub trait LogSink: Debug {
    fn log(&self, message: &str);
}
