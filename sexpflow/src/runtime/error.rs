// Error handling for the sexpflow runtime

use crate::runtime::values::{Arity, Diagnostic, Symbol, Value};
use std::fmt;

pub type EvalResult<T> = Result<T, EvalError>;

/// Ceilings enforced by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Nesting of closure applications
    CallDepth,
    /// Evaluation steps in one top-level evaluation
    Steps,
    /// Nesting of list forms under evaluation
    EvalDepth,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::CallDepth => write!(f, "call depth"),
            Resource::Steps => write!(f, "evaluation steps"),
            Resource::EvalDepth => write!(f, "evaluation depth"),
        }
    }
}

/// What went wrong during evaluation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalErrorKind {
    #[error("Unbound symbol: {symbol}")]
    UnboundSymbol { symbol: Symbol },

    #[error("Arity mismatch in {callee}: expected {expected}, got {got}")]
    ArityMismatch {
        callee: String,
        expected: Arity,
        got: usize,
    },

    #[error("Type error in {operation}: expected {expected}, got {got}")]
    TypeMismatch {
        operation: String,
        expected: String,
        got: String,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Arithmetic overflow in {operation}")]
    ArithmeticOverflow { operation: String },

    #[error("Field not found: {key}")]
    FieldNotFound { key: String },

    #[error("Not callable: {value}")]
    NotCallable { value: String },

    /// The external system reported failure; `detail` is its diagnostic, verbatim
    #[error("External invocation of '{callee}' failed: {detail}")]
    ExternalInvocationFailure { callee: Symbol, detail: Diagnostic },

    #[error("Resource exhausted: {resource} exceeded the limit of {limit}")]
    ResourceExhausted { resource: Resource, limit: usize },

    #[error("Cancelled: {reason}")]
    Cancelled { reason: String },
}

/// An evaluation error plus the innermost form that raised it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}{}", describe_expr(.expr))]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub expr: Option<Value>,
}

/// Longest expression rendering kept in an error message.
const MAX_EXPR_CHARS: usize = 160;

fn describe_expr(expr: &Option<Value>) -> String {
    let Some(expr) = expr else {
        return String::new();
    };
    let rendered = expr.to_string();
    match rendered.char_indices().nth(MAX_EXPR_CHARS) {
        Some((cut, _)) => format!(" in {}...", &rendered[..cut]),
        None => format!(" in {}", rendered),
    }
}

impl EvalError {
    pub fn new(kind: EvalErrorKind) -> Self {
        Self { kind, expr: None }
    }

    pub fn unbound(symbol: &Symbol) -> Self {
        Self::new(EvalErrorKind::UnboundSymbol {
            symbol: symbol.clone(),
        })
    }

    pub fn arity(callee: impl Into<String>, expected: Arity, got: usize) -> Self {
        Self::new(EvalErrorKind::ArityMismatch {
            callee: callee.into(),
            expected,
            got,
        })
    }

    pub fn type_mismatch(operation: &str, expected: &str, got: &Value) -> Self {
        Self::new(EvalErrorKind::TypeMismatch {
            operation: operation.to_string(),
            expected: expected.to_string(),
            got: got.type_name().to_string(),
        })
    }

    pub fn field_not_found(key: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::FieldNotFound { key: key.into() })
    }

    pub fn overflow(operation: &str) -> Self {
        Self::new(EvalErrorKind::ArithmeticOverflow {
            operation: operation.to_string(),
        })
    }

    /// Attach the offending expression unless an inner form already did.
    pub fn with_expr(mut self, expr: &Value) -> Self {
        if self.expr.is_none() {
            self.expr = Some(expr.clone());
        }
        self
    }

    pub fn is_external_failure(&self) -> bool {
        matches!(self.kind, EvalErrorKind::ExternalInvocationFailure { .. })
    }
}

impl From<EvalErrorKind> for EvalError {
    fn from(kind: EvalErrorKind) -> Self {
        EvalError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_innermost_expression_wins() {
        let inner = Value::list(vec![Value::symbol("/"), Value::Integer(1), Value::Integer(0)]);
        let outer = Value::list(vec![Value::symbol("list"), inner.clone()]);
        let err = EvalError::new(EvalErrorKind::DivisionByZero)
            .with_expr(&inner)
            .with_expr(&outer);
        assert_eq!(err.expr, Some(inner));
        assert_eq!(err.to_string(), "Division by zero in (/ 1 0)");
    }

    #[test]
    fn test_messages() {
        let err = EvalError::arity("#<closure (a b)>", Arity::Fixed(2), 3);
        assert_eq!(
            err.to_string(),
            "Arity mismatch in #<closure (a b)>: expected 2, got 3"
        );
        let err = EvalError::new(EvalErrorKind::ExternalInvocationFailure {
            callee: Symbol::new("fetch"),
            detail: Diagnostic::new("http-503", "service unavailable"),
        });
        assert!(err.is_external_failure());
        assert_eq!(
            err.to_string(),
            "External invocation of 'fetch' failed: http-503: service unavailable"
        );
    }

    #[test]
    fn test_long_expressions_are_truncated() {
        let long = Value::list((0..200).map(Value::Integer).collect());
        let message = EvalError::unbound(&Symbol::new("x")).with_expr(&long).to_string();
        assert!(message.ends_with("..."));
        assert!(message.len() < 200);
    }
}
