// sexpflow Evaluator - walks symbolic values

use crate::config::EvaluationLimits;
use crate::runtime::cancellation::CancellationToken;
use crate::runtime::environment::{clear_unreachable_frames, Environment, WeakEnvironment};
use crate::runtime::error::{EvalError, EvalErrorKind, EvalResult, Resource};
use crate::runtime::host_interface::{AtomRegistry, ExternalInvoker, InvocationRequest, LogSink};
use crate::runtime::pure_host::{InMemoryAtomRegistry, PureHost, TracingLogSink};
use crate::runtime::special_forms::SpecialForm;
use crate::runtime::stdlib::PrimitiveContext;
use crate::runtime::values::{Arity, Closure, Diagnostic, Primitive, Symbol, Value};
use crate::stack::ensure_sufficient_stack;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// What a call-position expression resolved to.
#[derive(Debug, Clone)]
pub enum Callee {
    SpecialForm(SpecialForm),
    Closure(Rc<Closure>),
    Primitive(Rc<Primitive>),
    /// Unbound head symbol, delegated to the external system
    External(Symbol),
}

/// Tracked frames that trigger a collection in the middle of an evaluation
const MIN_COLLECTION_THRESHOLD: usize = 256;

/// Tree-walking interpreter.
///
/// Single-threaded and synchronous. External invocations block until the
/// invoker returns. Frames that `bind`, `define` or `set!` made
/// self-referential are tracked; the ones nothing outside their cycle holds
/// any more are cleared after each top-level evaluation, when the tracked
/// set outgrows its threshold, and when the evaluator is dropped.
pub struct Evaluator {
    invoker: Rc<dyn ExternalInvoker>,
    registry: Rc<dyn AtomRegistry>,
    log_sink: Rc<dyn LogSink>,
    limits: EvaluationLimits,
    cancellation: CancellationToken,
    call_depth: usize,
    eval_depth: usize,
    steps: usize,
    cyclic_frames: HashMap<usize, WeakEnvironment>,
    /// Tracked frames left by the last collection
    surviving_cycles: usize,
    collection_threshold: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("invoker", &self.invoker)
            .field("registry", &self.registry)
            .field("limits", &self.limits)
            .field("call_depth", &self.call_depth)
            .field("steps", &self.steps)
            .finish()
    }
}

impl Evaluator {
    /// An evaluator with pure collaborators: no external system, an
    /// in-memory atom registry and `tracing` log output.
    pub fn new() -> Self {
        Evaluator {
            invoker: Rc::new(PureHost::new()),
            registry: Rc::new(InMemoryAtomRegistry::new()),
            log_sink: Rc::new(TracingLogSink),
            limits: EvaluationLimits::default(),
            cancellation: CancellationToken::new(),
            call_depth: 0,
            eval_depth: 0,
            steps: 0,
            cyclic_frames: HashMap::new(),
            surviving_cycles: 0,
            collection_threshold: MIN_COLLECTION_THRESHOLD,
        }
    }

    pub fn with_invoker(mut self, invoker: Rc<dyn ExternalInvoker>) -> Self {
        self.invoker = invoker;
        self
    }

    pub fn with_registry(mut self, registry: Rc<dyn AtomRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_log_sink(mut self, log_sink: Rc<dyn LogSink>) -> Self {
        self.log_sink = log_sink;
        self
    }

    pub fn with_limits(mut self, limits: EvaluationLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn set_cancellation(&mut self, cancellation: CancellationToken) {
        self.cancellation = cancellation;
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn limits(&self) -> &EvaluationLimits {
        &self.limits
    }

    /// Steps taken by the current (or last) top-level evaluation.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub(crate) fn registry(&self) -> &dyn AtomRegistry {
        &*self.registry
    }

    /// Evaluate `expr` in `env`. The step budget restarts with every
    /// top-level call.
    pub fn evaluate(&mut self, expr: &Value, env: &Environment) -> EvalResult<Value> {
        let top_level = self.eval_depth == 0;
        if top_level {
            self.steps = 0;
        }
        let result = self.eval(expr, env).map_err(|e| e.with_expr(expr));
        if top_level && self.cyclic_frames.len() > self.surviving_cycles {
            self.collect_cycles();
        }
        result
    }

    /// Apply a procedure value to already-evaluated arguments.
    pub fn apply(&mut self, callee: &Value, args: Vec<Value>) -> EvalResult<Value> {
        match Self::callee_from_value(callee.clone())? {
            Callee::Closure(closure) => self.apply_closure(&closure, args),
            Callee::Primitive(primitive) => self.apply_primitive(&primitive, &args),
            Callee::SpecialForm(_) | Callee::External(_) => Err(EvalError::new(
                EvalErrorKind::NotCallable {
                    value: callee.to_string(),
                },
            )),
        }
    }

    pub(crate) fn eval(&mut self, expr: &Value, env: &Environment) -> EvalResult<Value> {
        self.tick()?;
        match expr {
            Value::Symbol(symbol) => env.lookup(symbol),
            Value::List(items) => {
                if self.eval_depth >= self.limits.max_eval_depth {
                    return Err(self.exhausted(Resource::EvalDepth, self.limits.max_eval_depth));
                }
                self.eval_depth += 1;
                let result = ensure_sufficient_stack(|| self.eval_list(items, env));
                self.eval_depth -= 1;
                result.map_err(|e| e.with_expr(expr))
            }
            other => Ok(other.clone()),
        }
    }

    fn eval_list(&mut self, items: &[Value], env: &Environment) -> EvalResult<Value> {
        let Some((head, args)) = items.split_first() else {
            return Ok(Value::Nil);
        };
        match self.resolve_head(head, env)? {
            Callee::SpecialForm(form) => self.eval_special_form(form, args, env),
            Callee::Closure(closure) => {
                let args = self.eval_args(args, env)?;
                self.apply_closure(&closure, args)
            }
            Callee::Primitive(primitive) => {
                let args = self.eval_args(args, env)?;
                self.apply_primitive(&primitive, &args)
            }
            Callee::External(symbol) => {
                let args = self.eval_args(args, env)?;
                self.invoke_external(&symbol, &args)
            }
        }
    }

    /// Resolve a call-position expression once. Special forms win over
    /// bindings; an unbound symbol is an external invocation.
    pub fn resolve_head(&mut self, head: &Value, env: &Environment) -> EvalResult<Callee> {
        match head {
            Value::Symbol(symbol) => {
                if let Some(form) = SpecialForm::from_symbol(symbol) {
                    return Ok(Callee::SpecialForm(form));
                }
                match env.try_lookup(symbol) {
                    Some(value) => Self::callee_from_value(value),
                    None => Ok(Callee::External(symbol.clone())),
                }
            }
            Value::List(_) => {
                let value = self.eval(head, env)?;
                Self::callee_from_value(value)
            }
            other => Err(EvalError::new(EvalErrorKind::NotCallable {
                value: other.to_string(),
            })),
        }
    }

    fn callee_from_value(value: Value) -> EvalResult<Callee> {
        match value {
            Value::Closure(closure) => Ok(Callee::Closure(closure)),
            Value::Primitive(primitive) => Ok(Callee::Primitive(primitive)),
            other => Err(EvalError::new(EvalErrorKind::NotCallable {
                value: other.to_string(),
            })),
        }
    }

    /// Left to right, in the caller's environment.
    fn eval_args(&mut self, args: &[Value], env: &Environment) -> EvalResult<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg, env)).collect()
    }

    /// Evaluate forms in order, returning the last value (`Nil` if none).
    pub(crate) fn eval_sequence(&mut self, body: &[Value], env: &Environment) -> EvalResult<Value> {
        let mut last = Value::Nil;
        for expr in body {
            last = self.eval(expr, env)?;
        }
        Ok(last)
    }

    pub(crate) fn apply_closure(&mut self, closure: &Rc<Closure>, args: Vec<Value>) -> EvalResult<Value> {
        if args.len() != closure.params.len() {
            return Err(EvalError::arity(
                closure.to_string(),
                Arity::Fixed(closure.params.len()),
                args.len(),
            ));
        }
        if self.call_depth >= self.limits.max_call_depth {
            return Err(self.exhausted(Resource::CallDepth, self.limits.max_call_depth));
        }

        // Parented to the captured environment, never the caller's
        let call_env = closure.env.child();
        for (param, arg) in closure.params.iter().zip(args) {
            call_env.define(param.clone(), arg);
        }

        self.call_depth += 1;
        trace!(depth = self.call_depth, "applying closure");
        let result = self.eval(&closure.body, &call_env);
        self.call_depth -= 1;
        result
    }

    fn apply_primitive(&mut self, primitive: &Primitive, args: &[Value]) -> EvalResult<Value> {
        if !primitive.arity.accepts(args.len()) {
            return Err(EvalError::arity(
                primitive.name,
                primitive.arity.clone(),
                args.len(),
            ));
        }
        let ctx = PrimitiveContext {
            log_sink: &*self.log_sink,
        };
        (primitive.func)(args, &ctx)
    }

    /// Hand an unresolved call to the external system and wait for it.
    fn invoke_external(&mut self, callee: &Symbol, args: &[Value]) -> EvalResult<Value> {
        self.check_cancelled()?;
        debug!(callee = %callee, args = args.len(), "invoking external");

        let outcome = self.invoker.invoke(InvocationRequest {
            callee,
            args,
            cancellation: &self.cancellation,
        });

        // Resumption point: a cancellation wins over whatever came back
        self.check_cancelled()?;

        let detail = match outcome {
            Ok(result) if result.succeeded => return Ok(result.payload),
            Ok(result) => result.diagnostic.unwrap_or_else(|| {
                Diagnostic::new(
                    "external-failure",
                    format!("'{}' reported failure without a diagnostic", callee),
                )
            }),
            Err(fault) => fault,
        };
        warn!(callee = %callee, code = %detail.code, "external invocation failed: {}", detail.message);
        Err(EvalError::new(EvalErrorKind::ExternalInvocationFailure {
            callee: callee.clone(),
            detail,
        }))
    }

    fn tick(&mut self) -> EvalResult<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(self.exhausted(Resource::Steps, self.limits.max_steps));
        }
        self.check_cancelled()
    }

    pub(crate) fn check_cancelled(&self) -> EvalResult<()> {
        match self.cancellation.reason() {
            Some(reason) => Err(EvalError::new(EvalErrorKind::Cancelled {
                reason: reason.to_string(),
            })),
            None => Ok(()),
        }
    }

    fn exhausted(&self, resource: Resource, limit: usize) -> EvalError {
        warn!(%resource, limit, "evaluation limit reached");
        EvalError::new(EvalErrorKind::ResourceExhausted { resource, limit })
    }

    /// `bind`/`define`: install `value` in `env`'s own frame.
    pub(crate) fn define_in(&mut self, env: &Environment, symbol: Symbol, value: Value) {
        if env.reachable_from(&value) {
            self.track_cycle(env);
        }
        env.define(symbol, value);
    }

    /// `set!`: overwrite the nearest existing binding.
    pub(crate) fn set_in(&mut self, env: &Environment, symbol: &Symbol, value: Value) -> EvalResult<()> {
        let frame = env
            .defining_frame(symbol)
            .ok_or_else(|| EvalError::unbound(symbol))?;
        self.define_in(&frame, symbol.clone(), value);
        Ok(())
    }

    fn track_cycle(&mut self, env: &Environment) {
        let id = env.frame_id();
        let known = self
            .cyclic_frames
            .get(&id)
            .and_then(WeakEnvironment::upgrade)
            .is_some_and(|frame| frame.ptr_eq(env));
        if !known {
            trace!("frame now reaches itself through a stored closure");
            self.cyclic_frames.insert(id, env.downgrade());
            if self.cyclic_frames.len() >= self.collection_threshold {
                self.collect_cycles();
            }
        }
    }

    /// Clear the tracked frames that only their own cycles keep alive, so
    /// the frames and their closures are freed. Frames still reachable from
    /// outside, including through a closure the caller holds, keep their
    /// bindings. Returns the number of frames cleared.
    pub fn collect_cycles(&mut self) -> usize {
        let candidates: Vec<Environment> = self
            .cyclic_frames
            .values()
            .filter_map(WeakEnvironment::upgrade)
            .collect();
        let cleared = clear_unreachable_frames(candidates);
        self.cyclic_frames.retain(|_, weak| weak.upgrade().is_some());
        self.surviving_cycles = self.cyclic_frames.len();
        self.collection_threshold = (self.surviving_cycles * 2).max(MIN_COLLECTION_THRESHOLD);
        if cleared > 0 {
            debug!(cleared, tracked = self.surviving_cycles, "released unreachable scopes");
        }
        cleared
    }

    pub fn tracked_cycles(&self) -> usize {
        self.cyclic_frames.len()
    }
}

impl Drop for Evaluator {
    fn drop(&mut self) {
        self.collect_cycles();
    }
}
