//! sexpflow - S-expression workflow evaluator
//!
//! A small interpreted language for composing atomic tasks, tools and control
//! flow. Source text is read into symbolic values by the [`parser`], then
//! walked by the [`runtime::Evaluator`] against a chain of lexical
//! environments. Call-position symbols that are neither special forms,
//! variables nor primitives are delegated to an external task/tool system
//! through [`runtime::host_interface::ExternalInvoker`].
//!
//! ```
//! use sexpflow::{evaluate_string, Value};
//!
//! let value = evaluate_string("(let ((x 2)) (* x 21))", []).unwrap();
//! assert_eq!(value, Value::Integer(42));
//! ```

pub mod config;
pub mod parser;
pub mod runtime;
pub mod stack;

pub use config::{EvaluationLimits, EvaluatorConfig, ReaderConfig};
pub use parser::{parse, parse_all, ParseError, ParseErrorKind, Reader, SourcePosition};
pub use runtime::error::{EvalError, EvalErrorKind, EvalResult};
pub use runtime::values::{Closure, Diagnostic, ExternalResult, Symbol, Value};
pub use runtime::{evaluate_string, Runtime, WorkflowError};
