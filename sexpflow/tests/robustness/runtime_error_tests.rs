// sexpflow Runtime Error Handling Tests
// Tests for runtime error detection and reporting

use sexpflow::runtime::{Resource, StandardLibrary};
use sexpflow::runtime::environment::Environment;
use sexpflow::runtime::evaluator::Evaluator;
use sexpflow::runtime::values::Arity;
use sexpflow::{parse, EvalErrorKind, Symbol, Value};

/// Test runner for runtime error tests
struct RuntimeErrorTestRunner {
    evaluator: Evaluator,
    env: Environment,
}

impl RuntimeErrorTestRunner {
    fn new() -> Self {
        Self {
            evaluator: Evaluator::new(),
            env: StandardLibrary::create_global_environment().child(),
        }
    }

    fn run_error_test(&mut self, source: &str) -> EvalErrorKind {
        let expr = parse(source).unwrap_or_else(|e| panic!("Parse error: {}", e));
        match self.evaluator.evaluate(&expr, &self.env) {
            Ok(result) => panic!("Expected {:?} to fail, but got success: {}", source, result),
            Err(error) => {
                // Every error renders as a single line with a kind and the form
                let message = error.to_string();
                assert!(!message.is_empty());
                error.kind
            }
        }
    }

    fn run_success_test(&mut self, source: &str) -> Value {
        let expr = parse(source).unwrap_or_else(|e| panic!("Parse error: {}", e));
        self.evaluator
            .evaluate(&expr, &self.env)
            .unwrap_or_else(|e| panic!("Evaluation error for {:?}: {}", source, e))
    }
}

#[test]
fn test_unbound_symbol() {
    let mut runner = RuntimeErrorTestRunner::new();
    assert_eq!(
        runner.run_error_test("(+ 1 undefined-var)"),
        EvalErrorKind::UnboundSymbol { symbol: Symbol::new("undefined-var") }
    );
}

#[test]
fn test_closure_arity_mismatch() {
    let mut runner = RuntimeErrorTestRunner::new();
    runner.run_success_test("(bind add2 (lambda (a b) (+ a b)))");
    for call in ["(add2 1)", "(add2 1 2 3)", "(add2)"] {
        match runner.run_error_test(call) {
            EvalErrorKind::ArityMismatch { callee, expected, .. } => {
                assert_eq!(callee, "#<closure (a b)>");
                assert_eq!(expected, Arity::Fixed(2));
            }
            other => panic!("expected arity mismatch for {}, got {:?}", call, other),
        }
    }
    assert_eq!(runner.run_success_test("(add2 1 2)"), Value::Integer(3));
}

#[test]
fn test_primitive_arity_mismatch() {
    let mut runner = RuntimeErrorTestRunner::new();
    assert_eq!(
        runner.run_error_test("(not 1 2)"),
        EvalErrorKind::ArityMismatch { callee: "not".to_string(), expected: Arity::Fixed(1), got: 2 }
    );
}

#[test]
fn test_type_mismatch() {
    let mut runner = RuntimeErrorTestRunner::new();
    assert_eq!(
        runner.run_error_test("(< 1 \"two\")"),
        EvalErrorKind::TypeMismatch {
            operation: "<".to_string(),
            expected: "number".to_string(),
            got: "string".to_string(),
        }
    );
}

#[test]
fn test_division_by_zero() {
    let mut runner = RuntimeErrorTestRunner::new();
    assert_eq!(runner.run_error_test("(/ 1 0)"), EvalErrorKind::DivisionByZero);
    assert_eq!(runner.run_error_test("(/ 1.0 0.0)"), EvalErrorKind::DivisionByZero);
}

#[test]
fn test_not_callable() {
    let mut runner = RuntimeErrorTestRunner::new();
    assert!(matches!(runner.run_error_test("(\"f\" 1)"), EvalErrorKind::NotCallable { .. }));
    assert!(matches!(runner.run_error_test("(#t)"), EvalErrorKind::NotCallable { .. }));
}

#[test]
fn test_field_not_found() {
    let mut runner = RuntimeErrorTestRunner::new();
    assert_eq!(
        runner.run_error_test("(get-field (list (list \"a\" 1)) \"b\")"),
        EvalErrorKind::FieldNotFound { key: "b".to_string() }
    );
}

#[test]
fn test_runaway_recursion_is_resource_exhausted() {
    let mut runner = RuntimeErrorTestRunner::new();
    runner.run_success_test("(bind forever (lambda (n) (forever (+ n 1))))");
    match runner.run_error_test("(forever 0)") {
        EvalErrorKind::ResourceExhausted { resource, .. } => {
            assert!(matches!(resource, Resource::CallDepth | Resource::EvalDepth));
        }
        other => panic!("expected resource exhaustion, got {:?}", other),
    }
    // The evaluator is usable afterwards
    assert_eq!(runner.run_success_test("(+ 1 1)"), Value::Integer(2));
}

#[test]
fn test_fail_fast_skips_later_siblings() {
    let mut runner = RuntimeErrorTestRunner::new();
    runner.run_success_test("(bind touched #f)");
    runner.run_error_test("(list (/ 1 0) (set! touched #t))");
    assert_eq!(runner.run_success_test("touched"), Value::Boolean(false));
}

#[test]
fn test_error_reports_offending_expression() {
    let mut runner = RuntimeErrorTestRunner::new();
    let expr = parse("(let ((x 1)) (+ x (first 5)))").unwrap();
    let error = runner.evaluator.evaluate(&expr, &runner.env).unwrap_err();
    assert_eq!(error.expr.as_ref().map(|e| e.to_string()), Some("(first 5)".to_string()));
    assert_eq!(
        error.to_string(),
        "Type error in first: expected list, got integer in (first 5)"
    );
}
