// External invocation boundary: delegation, failures, atom registration
// and cancellation at the resumption point

use pretty_assertions::assert_eq;
use sexpflow::runtime::cancellation::CancellationToken;
use sexpflow::runtime::host_interface::{ExternalInvoker, InvocationRequest};
use sexpflow::runtime::pure_host::{FnInvoker, InMemoryAtomRegistry, MemoryLogSink};
use sexpflow::{Diagnostic, EvalErrorKind, ExternalResult, Runtime, Symbol, Value, WorkflowError};
use std::cell::RefCell;
use std::rc::Rc;

/// Host that answers from a fixed script and records every call.
#[derive(Debug, Default)]
struct ScriptedHost {
    calls: RefCell<Vec<(String, Vec<Value>)>>,
}

impl ExternalInvoker for ScriptedHost {
    fn invoke(&self, request: InvocationRequest<'_>) -> Result<ExternalResult, Diagnostic> {
        self.calls
            .borrow_mut()
            .push((request.callee.to_string(), request.args.to_vec()));
        match request.callee.as_str() {
            "echo" => Ok(ExternalResult::success(Value::list(request.args.to_vec()))),
            "fetch-user" => Ok(ExternalResult::success(Value::from_json(&serde_json::json!({
                "name": "ada",
                "roles": ["admin", "dev"]
            })))),
            "flaky" => Ok(ExternalResult::failure(
                Diagnostic::new("http-503", "service unavailable")
                    .with_details(serde_json::json!({"retry_after": 2})),
            )),
            "broken" => Err(Diagnostic::new("transport", "connection reset")),
            other => Ok(ExternalResult::failure(Diagnostic::new(
                "unknown-tool",
                format!("no tool named {}", other),
            ))),
        }
    }
}

fn runtime_with(host: Rc<ScriptedHost>) -> Runtime {
    Runtime::new().with_invoker(host)
}

fn external_failure(result: Result<Value, WorkflowError>) -> (Symbol, Diagnostic) {
    match result {
        Err(WorkflowError::Eval(e)) => match e.kind {
            EvalErrorKind::ExternalInvocationFailure { callee, detail } => (callee, detail),
            other => panic!("expected external failure, got {:?}", other),
        },
        other => panic!("expected evaluation error, got {:?}", other),
    }
}

#[test]
fn test_success_unwraps_payload() {
    let host = Rc::new(ScriptedHost::default());
    let mut runtime = runtime_with(host.clone());
    let value = runtime.eval_source("(echo (+ 1 2) \"x\")").unwrap();
    assert_eq!(value, Value::list(vec![Value::Integer(3), Value::string("x")]));

    let calls = host.calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "echo");
    assert_eq!(calls[0].1, vec![Value::Integer(3), Value::string("x")]);
}

#[test]
fn test_json_payload_becomes_record() {
    let mut runtime = runtime_with(Rc::new(ScriptedHost::default()));
    let value = runtime
        .eval_source("(bind user (fetch-user 7)) (list (get-field user \"name\") (get-path user \"roles.1\"))")
        .unwrap();
    assert_eq!(value, Value::list(vec![Value::string("ada"), Value::string("dev")]));
}

#[test]
fn test_failure_carries_diagnostic_verbatim() {
    let mut runtime = runtime_with(Rc::new(ScriptedHost::default()));
    let (callee, detail) = external_failure(runtime.eval_source("(flaky 1)"));
    assert_eq!(callee, Symbol::new("flaky"));
    assert_eq!(detail.code, "http-503");
    assert_eq!(detail.message, "service unavailable");
    assert_eq!(detail.details, Some(serde_json::json!({"retry_after": 2})));
}

#[test]
fn test_fault_becomes_external_failure() {
    let mut runtime = runtime_with(Rc::new(ScriptedHost::default()));
    let (callee, detail) = external_failure(runtime.eval_source("(broken)"));
    assert_eq!(callee, Symbol::new("broken"));
    assert_eq!(detail, Diagnostic::new("transport", "connection reset"));
}

#[test]
fn test_workflow_branches_on_both_outcomes() {
    let source = r#"
        (bind run (lambda (result)
          (if (get-field result "succeeded")
              (list "ok" (get-field result "payload"))
              (list "failed" (get-path result "diagnostic.code")))))
        (list (run (attempt (echo 1))) (run (attempt (flaky))))
    "#;
    let mut runtime = runtime_with(Rc::new(ScriptedHost::default()));
    assert_eq!(
        runtime.eval_source(source).unwrap(),
        Value::list(vec![
            Value::list(vec![Value::string("ok"), Value::list(vec![Value::Integer(1)])]),
            Value::list(vec![Value::string("failed"), Value::string("http-503")]),
        ])
    );
}

#[test]
fn test_explicit_retry_loop() {
    let attempts = Rc::new(RefCell::new(0));
    let counter = attempts.clone();
    let invoker = FnInvoker::new(move |_request: InvocationRequest<'_>| {
        *counter.borrow_mut() += 1;
        if *counter.borrow() < 3 {
            Ok(ExternalResult::failure(Diagnostic::new("busy", "try again")))
        } else {
            Ok(ExternalResult::success(Value::string("done")))
        }
    });
    let source = r#"
        (bind outcome nil)
        (loop 5
          (if (if (null? outcome) #t (not (get-field outcome "succeeded")))
              (set! outcome (attempt (submit-job)))
              outcome))
        (get-field outcome "payload")
    "#;
    let mut runtime = Runtime::new().with_invoker(Rc::new(invoker));
    assert_eq!(runtime.eval_source(source).unwrap(), Value::string("done"));
    assert_eq!(*attempts.borrow(), 3);
}

#[test]
fn test_defatom_forwards_unevaluated_spec() {
    let registry = Rc::new(InMemoryAtomRegistry::new());
    let mut runtime = Runtime::new().with_registry(registry.clone());
    let value = runtime
        .eval_source("(defatom summarize (prompt \"Summarize {text}\") (model fast))")
        .unwrap();
    assert_eq!(value, Value::symbol("summarize"));
    assert_eq!(registry.names(), vec![Symbol::new("summarize")]);
    assert_eq!(
        registry.get(&Symbol::new("summarize")).unwrap()[0],
        Value::list(vec![Value::symbol("prompt"), Value::string("Summarize {text}")])
    );
}

#[test]
fn test_cancellation_wins_at_resumption_point() {
    let token = CancellationToken::new();
    let remote = token.clone();
    let invoker = FnInvoker::new(move |request: InvocationRequest<'_>| {
        // The driver gives up while the call is outstanding
        remote.cancel();
        assert!(request.cancellation.is_cancelled());
        Ok(ExternalResult::success(Value::Integer(1)))
    });
    let mut runtime = Runtime::new()
        .with_invoker(Rc::new(invoker))
        .with_cancellation(token);
    match runtime.eval_source("(slow-task)") {
        Err(WorkflowError::Eval(e)) => assert_eq!(
            e.kind,
            EvalErrorKind::Cancelled { reason: "cancelled by caller".to_string() }
        ),
        other => panic!("expected cancellation, got {:?}", other),
    }
}

#[test]
fn test_expired_deadline_stops_evaluation() {
    let token = CancellationToken::with_timeout(std::time::Duration::from_millis(0));
    let mut runtime = Runtime::new().with_cancellation(token);
    match runtime.eval_source("(loop 1000000 (+ 1 1))") {
        Err(WorkflowError::Eval(e)) => assert!(matches!(e.kind, EvalErrorKind::Cancelled { .. })),
        other => panic!("expected cancellation, got {:?}", other),
    }
}

#[test]
fn test_cancellation_is_not_caught_by_attempt() {
    let token = CancellationToken::new();
    let remote = token.clone();
    let invoker = FnInvoker::new(move |_request: InvocationRequest<'_>| {
        remote.cancel();
        Ok(ExternalResult::success(Value::Nil))
    });
    let mut runtime = Runtime::new()
        .with_invoker(Rc::new(invoker))
        .with_cancellation(token);
    let err = runtime.eval_source("(attempt (slow-task))").unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Eval(ref e) if matches!(e.kind, EvalErrorKind::Cancelled { .. })
    ));
}

#[test]
fn test_log_message_reaches_sink() {
    let sink = Rc::new(MemoryLogSink::new());
    let mut runtime = Runtime::new().with_log_sink(sink.clone());
    let value = runtime
        .eval_source("(bind n 3) (log-message \"processed\" n 'items (list 1.5 #t))")
        .unwrap();
    assert_eq!(value, Value::Nil);
    assert_eq!(sink.lines(), vec!["processed 3 items (1.5 #t)"]);
}

#[test]
fn test_log_message_default_sink_uses_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter("sexpflow=debug")
        .with_test_writer()
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        let mut runtime = Runtime::new();
        assert_eq!(
            runtime.eval_source("(log-message \"hello\")").unwrap(),
            Value::Nil
        );
    });
}
