//! Default collaborators for standalone use and testing.
//!
//! None of these talk to a real task/tool system. [`PureHost`] refuses every
//! invocation, [`InMemoryAtomRegistry`] keeps definitions in a map, and
//! [`TracingLogSink`] forwards workflow log lines to `tracing`.

use crate::runtime::host_interface::{AtomRegistry, ExternalInvoker, InvocationRequest, LogSink};
use crate::runtime::values::{Diagnostic, ExternalResult, Symbol, Value};
use indexmap::IndexMap;
use std::cell::RefCell;

/// Invoker for pure evaluation: every external call fails with a
/// `not-available` diagnostic.
#[derive(Debug, Default)]
pub struct PureHost;

impl PureHost {
    pub fn new() -> Self {
        Self
    }
}

impl ExternalInvoker for PureHost {
    fn invoke(&self, request: InvocationRequest<'_>) -> Result<ExternalResult, Diagnostic> {
        Ok(ExternalResult::failure(Diagnostic::new(
            "not-available",
            format!(
                "'{}' is not a known procedure and no external system is configured",
                request.callee
            ),
        )))
    }
}

/// Invoker backed by a callback.
pub struct FnInvoker<F>
where
    F: Fn(InvocationRequest<'_>) -> Result<ExternalResult, Diagnostic>,
{
    invoke_fn: F,
}

impl<F> FnInvoker<F>
where
    F: Fn(InvocationRequest<'_>) -> Result<ExternalResult, Diagnostic>,
{
    pub fn new(invoke_fn: F) -> Self {
        Self { invoke_fn }
    }
}

impl<F> std::fmt::Debug for FnInvoker<F>
where
    F: Fn(InvocationRequest<'_>) -> Result<ExternalResult, Diagnostic>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnInvoker")
            .field("invoke_fn", &"<closure>")
            .finish()
    }
}

impl<F> ExternalInvoker for FnInvoker<F>
where
    F: Fn(InvocationRequest<'_>) -> Result<ExternalResult, Diagnostic>,
{
    fn invoke(&self, request: InvocationRequest<'_>) -> Result<ExternalResult, Diagnostic> {
        (self.invoke_fn)(request)
    }
}

/// Atom definitions kept in registration order. Re-registering a name
/// replaces its spec.
#[derive(Debug, Default)]
pub struct InMemoryAtomRegistry {
    atoms: RefCell<IndexMap<Symbol, Vec<Value>>>,
}

impl InMemoryAtomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &Symbol) -> Option<Vec<Value>> {
        self.atoms.borrow().get(name).cloned()
    }

    pub fn names(&self) -> Vec<Symbol> {
        self.atoms.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.atoms.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.borrow().is_empty()
    }
}

impl AtomRegistry for InMemoryAtomRegistry {
    fn register(&self, name: &Symbol, spec: &[Value]) -> Result<(), Diagnostic> {
        let previous = self.atoms.borrow_mut().insert(name.clone(), spec.to_vec());
        if previous.is_some() {
            tracing::debug!(atom = %name, "replaced atom definition");
        }
        Ok(())
    }
}

/// Writes `log-message` output as `info` events on the
/// `sexpflow::workflow` target.
#[derive(Debug, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, message: &str) {
        tracing::info!(target: "sexpflow::workflow", "{}", message);
    }
}

/// Keeps every logged line in memory.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    lines: RefCell<Vec<String>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }
}

impl LogSink for MemoryLogSink {
    fn log(&self, message: &str) {
        self.lines.borrow_mut().push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::cancellation::CancellationToken;

    #[test]
    fn test_pure_host_refuses_invocations() {
        let token = CancellationToken::new();
        let callee = Symbol::new("summarize");
        let result = PureHost::new()
            .invoke(InvocationRequest {
                callee: &callee,
                args: &[],
                cancellation: &token,
            })
            .unwrap();
        assert!(!result.succeeded);
        let diagnostic = result.diagnostic.unwrap();
        assert_eq!(diagnostic.code, "not-available");
        assert!(diagnostic.message.contains("summarize"));
    }

    #[test]
    fn test_fn_invoker_forwards_request() {
        let invoker = FnInvoker::new(|request: InvocationRequest<'_>| {
            Ok(ExternalResult::success(Value::Integer(request.args.len() as i64)))
        });
        let token = CancellationToken::new();
        let callee = Symbol::new("count");
        let result = invoker
            .invoke(InvocationRequest {
                callee: &callee,
                args: &[Value::Nil, Value::Nil],
                cancellation: &token,
            })
            .unwrap();
        assert_eq!(result.payload, Value::Integer(2));
    }

    #[test]
    fn test_registry_keeps_order_and_replaces() {
        let registry = InMemoryAtomRegistry::new();
        registry.register(&Symbol::new("b"), &[Value::Integer(1)]).unwrap();
        registry.register(&Symbol::new("a"), &[]).unwrap();
        registry.register(&Symbol::new("b"), &[Value::Integer(2)]).unwrap();
        assert_eq!(registry.names(), vec![Symbol::new("b"), Symbol::new("a")]);
        assert_eq!(registry.get(&Symbol::new("b")), Some(vec![Value::Integer(2)]));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_memory_sink_records_lines() {
        let sink = MemoryLogSink::new();
        sink.log("first");
        sink.log("second");
        assert_eq!(sink.lines(), vec!["first", "second"]);
    }
}
