// Runtime system for sexpflow
// This module contains the evaluator, standard library, and runtime value system

pub mod cancellation;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod host_interface;
pub mod pure_host;
pub mod records;
pub mod special_forms;
pub mod stdlib;
pub mod values;

pub use cancellation::CancellationToken;
pub use environment::Environment;
pub use error::{EvalError, EvalErrorKind, EvalResult, Resource};
pub use evaluator::Evaluator;
pub use host_interface::{AtomRegistry, ExternalInvoker, InvocationRequest, LogSink};
pub use stdlib::StandardLibrary;
pub use values::{Value, Symbol};

use crate::config::EvaluatorConfig;
use crate::parser::{ParseError, Reader};
use std::rc::Rc;

/// Failure of a whole workflow: it either did not read or did not run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),
}

/// Entry point for drivers: a reader, an evaluator and a global scope.
///
/// Primitives live in a root frame; workflow definitions and initial
/// bindings go into a child of it, so a workflow can shadow a primitive
/// without losing it for other runtimes.
#[derive(Debug)]
pub struct Runtime {
    // Dropped before `evaluator`, whose drop collects unreachable scopes
    globals: Environment,
    reader: Reader,
    evaluator: Evaluator,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(EvaluatorConfig::default())
    }

    pub fn with_config(config: EvaluatorConfig) -> Self {
        let root = StandardLibrary::create_global_environment();
        Runtime {
            globals: root.child(),
            reader: Reader::new(config.reader),
            evaluator: Evaluator::new().with_limits(config.limits),
        }
    }

    pub fn with_invoker(mut self, invoker: Rc<dyn ExternalInvoker>) -> Self {
        self.evaluator = self.evaluator.with_invoker(invoker);
        self
    }

    pub fn with_registry(mut self, registry: Rc<dyn AtomRegistry>) -> Self {
        self.evaluator = self.evaluator.with_registry(registry);
        self
    }

    pub fn with_log_sink(mut self, log_sink: Rc<dyn LogSink>) -> Self {
        self.evaluator = self.evaluator.with_log_sink(log_sink);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.evaluator.set_cancellation(cancellation);
        self
    }

    pub fn global_env(&self) -> &Environment {
        &self.globals
    }

    pub fn evaluator_mut(&mut self) -> &mut Evaluator {
        &mut self.evaluator
    }

    pub fn define_global(&mut self, name: &str, value: Value) {
        self.evaluator
            .define_in(&self.globals, Symbol::new(name), value);
    }

    /// Evaluate one already-read expression in the global scope.
    pub fn eval(&mut self, expr: &Value) -> EvalResult<Value> {
        self.evaluator.evaluate(expr, &self.globals)
    }

    /// Read every top-level form of `source`, then evaluate them in order.
    /// Returns the last value; empty source yields `nil`. Nothing runs if
    /// the source does not read.
    pub fn eval_source(&mut self, source: &str) -> Result<Value, WorkflowError> {
        let forms = self.reader.parse_all(source)?;
        let mut last = Value::Nil;
        for form in &forms {
            last = self.eval(form)?;
        }
        Ok(last)
    }

    /// Install `initial_bindings` as globals, then run `source`.
    pub fn evaluate_string(
        &mut self,
        source: &str,
        initial_bindings: impl IntoIterator<Item = (Symbol, Value)>,
    ) -> Result<Value, WorkflowError> {
        for (symbol, value) in initial_bindings {
            self.evaluator.define_in(&self.globals, symbol, value);
        }
        self.eval_source(source)
    }

    /// See [`Evaluator::collect_cycles`].
    pub fn collect_cycles(&mut self) -> usize {
        self.evaluator.collect_cycles()
    }
}

/// Evaluate a complete workflow with default configuration and pure
/// collaborators. Closures in the result keep their scopes after the
/// temporary runtime is gone.
pub fn evaluate_string(
    source: &str,
    initial_bindings: impl IntoIterator<Item = (Symbol, Value)>,
) -> Result<Value, WorkflowError> {
    Runtime::new().evaluate_string(source, initial_bindings)
}
