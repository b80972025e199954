//! Special forms: call-position keywords whose arguments are not uniformly
//! pre-evaluated. Each form controls its own evaluation order.

use crate::runtime::environment::Environment;
use crate::runtime::error::{EvalError, EvalErrorKind, EvalResult};
use crate::runtime::evaluator::Evaluator;
use crate::runtime::records;
use crate::runtime::values::{Arity, Closure, ExternalResult, Symbol, Value};
use std::collections::HashSet;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialForm {
    Quote,
    If,
    Let,
    Bind,
    Define,
    Lambda,
    Defatom,
    Loop,
    Set,
    List,
    GetField,
    GetPath,
    Begin,
    Attempt,
}

impl SpecialForm {
    pub fn from_symbol(symbol: &Symbol) -> Option<Self> {
        Some(match symbol.as_str() {
            "quote" => SpecialForm::Quote,
            "if" => SpecialForm::If,
            "let" => SpecialForm::Let,
            "bind" => SpecialForm::Bind,
            "define" => SpecialForm::Define,
            "lambda" => SpecialForm::Lambda,
            "defatom" => SpecialForm::Defatom,
            "loop" => SpecialForm::Loop,
            "set!" => SpecialForm::Set,
            "list" => SpecialForm::List,
            "get-field" => SpecialForm::GetField,
            "get-path" => SpecialForm::GetPath,
            "begin" => SpecialForm::Begin,
            "attempt" => SpecialForm::Attempt,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            SpecialForm::Quote => "quote",
            SpecialForm::If => "if",
            SpecialForm::Let => "let",
            SpecialForm::Bind => "bind",
            SpecialForm::Define => "define",
            SpecialForm::Lambda => "lambda",
            SpecialForm::Defatom => "defatom",
            SpecialForm::Loop => "loop",
            SpecialForm::Set => "set!",
            SpecialForm::List => "list",
            SpecialForm::GetField => "get-field",
            SpecialForm::GetPath => "get-path",
            SpecialForm::Begin => "begin",
            SpecialForm::Attempt => "attempt",
        }
    }

    /// Number of operands the form accepts.
    pub fn arity(self) -> Arity {
        match self {
            SpecialForm::Quote | SpecialForm::Attempt => Arity::Fixed(1),
            SpecialForm::If => Arity::Range(2, 3),
            SpecialForm::Let | SpecialForm::Defatom => Arity::Variadic(1),
            SpecialForm::Lambda => Arity::Variadic(2),
            SpecialForm::Bind
            | SpecialForm::Define
            | SpecialForm::Loop
            | SpecialForm::Set
            | SpecialForm::GetField
            | SpecialForm::GetPath => Arity::Fixed(2),
            SpecialForm::List | SpecialForm::Begin => Arity::Variadic(0),
        }
    }
}

fn symbol_operand<'a>(form: SpecialForm, value: &'a Value) -> EvalResult<&'a Symbol> {
    value
        .as_symbol()
        .ok_or_else(|| EvalError::type_mismatch(form.name(), "symbol", value))
}

impl Evaluator {
    pub(crate) fn eval_special_form(
        &mut self,
        form: SpecialForm,
        args: &[Value],
        env: &Environment,
    ) -> EvalResult<Value> {
        let arity = form.arity();
        if !arity.accepts(args.len()) {
            return Err(EvalError::arity(form.name(), arity, args.len()));
        }
        match form {
            SpecialForm::Quote => Ok(args[0].clone()),
            SpecialForm::If => self.eval_if(args, env),
            SpecialForm::Let => self.eval_let(&args[0], &args[1..], env),
            SpecialForm::Bind | SpecialForm::Define => self.eval_bind(form, args, env),
            SpecialForm::Lambda => self.eval_lambda(&args[0], &args[1..], env),
            SpecialForm::Defatom => self.eval_defatom(&args[0], &args[1..]),
            SpecialForm::Loop => self.eval_loop(&args[0], &args[1], env),
            SpecialForm::Set => self.eval_set(args, env),
            SpecialForm::List => {
                let items = args
                    .iter()
                    .map(|arg| self.eval(arg, env))
                    .collect::<EvalResult<Vec<_>>>()?;
                Ok(Value::list(items))
            }
            SpecialForm::GetField => {
                let target = self.eval(&args[0], env)?;
                let key = self.eval(&args[1], env)?;
                records::get_field(&target, &key)
            }
            SpecialForm::GetPath => {
                let target = self.eval(&args[0], env)?;
                let path = self.eval(&args[1], env)?;
                records::get_path(&target, &path)
            }
            SpecialForm::Begin => self.eval_sequence(args, env),
            SpecialForm::Attempt => self.eval_attempt(&args[0], env),
        }
    }

    fn eval_if(&mut self, args: &[Value], env: &Environment) -> EvalResult<Value> {
        let condition = self.eval(&args[0], env)?;
        if condition.is_truthy() {
            self.eval(&args[1], env)
        } else if let Some(else_branch) = args.get(2) {
            self.eval(else_branch, env)
        } else {
            Ok(Value::Nil)
        }
    }

    /// Simultaneous binding: every initializer runs in the outer
    /// environment before the new scope exists.
    fn eval_let(&mut self, bindings: &Value, body: &[Value], env: &Environment) -> EvalResult<Value> {
        let pairs = bindings
            .list_items()
            .ok_or_else(|| EvalError::type_mismatch("let", "list of bindings", bindings))?;

        let mut values = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let (symbol, init) = match pair.list_items() {
                Some([Value::Symbol(symbol), init]) => (symbol, init),
                _ => return Err(EvalError::type_mismatch("let", "(symbol expression) binding", pair)),
            };
            values.push((symbol.clone(), self.eval(init, env)?));
        }

        let scope = env.child();
        for (symbol, value) in values {
            scope.define(symbol, value);
        }
        self.eval_sequence(body, &scope)
    }

    /// `(bind sym expr)` and `(define sym expr)` install the binding in the
    /// current frame and return the value.
    fn eval_bind(&mut self, form: SpecialForm, args: &[Value], env: &Environment) -> EvalResult<Value> {
        let symbol = symbol_operand(form, &args[0])?;
        let value = self.eval(&args[1], env)?;
        self.define_in(env, symbol.clone(), value.clone());
        Ok(value)
    }

    fn eval_lambda(&mut self, params: &Value, body: &[Value], env: &Environment) -> EvalResult<Value> {
        let param_values = params
            .list_items()
            .ok_or_else(|| EvalError::type_mismatch("lambda", "parameter list", params))?;

        let mut seen = HashSet::with_capacity(param_values.len());
        let mut symbols = Vec::with_capacity(param_values.len());
        for param in param_values {
            let symbol = symbol_operand(SpecialForm::Lambda, param)?;
            if !seen.insert(symbol.clone()) {
                return Err(EvalError::new(EvalErrorKind::TypeMismatch {
                    operation: "lambda".to_string(),
                    expected: "distinct parameter names".to_string(),
                    got: format!("duplicate parameter {}", symbol),
                }));
            }
            symbols.push(symbol.clone());
        }

        let body = match body {
            [single] => single.clone(),
            forms => {
                let mut sequence = Vec::with_capacity(forms.len() + 1);
                sequence.push(Value::symbol("begin"));
                sequence.extend_from_slice(forms);
                Value::list(sequence)
            }
        };
        Ok(Value::Closure(Rc::new(Closure::new(symbols, body, env.clone()))))
    }

    fn eval_defatom(&mut self, name: &Value, spec: &[Value]) -> EvalResult<Value> {
        let name = symbol_operand(SpecialForm::Defatom, name)?;
        debug!(atom = %name, spec_forms = spec.len(), "registering atom");
        self.registry().register(name, spec).map_err(|detail| {
            EvalError::new(EvalErrorKind::ExternalInvocationFailure {
                callee: name.clone(),
                detail,
            })
        })?;
        Ok(Value::Symbol(name.clone()))
    }

    fn eval_loop(&mut self, count: &Value, body: &Value, env: &Environment) -> EvalResult<Value> {
        let n = match self.eval(count, env)? {
            Value::Integer(n) if n >= 0 => n,
            Value::Integer(n) => {
                return Err(EvalError::new(EvalErrorKind::TypeMismatch {
                    operation: "loop".to_string(),
                    expected: "non-negative integer".to_string(),
                    got: format!("negative integer {}", n),
                }))
            }
            other => return Err(EvalError::type_mismatch("loop", "non-negative integer", &other)),
        };
        let mut last = Value::Nil;
        for _ in 0..n {
            last = self.eval(body, env)?;
        }
        Ok(last)
    }

    fn eval_set(&mut self, args: &[Value], env: &Environment) -> EvalResult<Value> {
        let symbol = symbol_operand(SpecialForm::Set, &args[0])?;
        let value = self.eval(&args[1], env)?;
        self.set_in(env, symbol, value.clone())?;
        Ok(value)
    }

    /// External failures inside `expr` become a failed `ExternalResult`
    /// the workflow can branch on; every other error still propagates.
    fn eval_attempt(&mut self, expr: &Value, env: &Environment) -> EvalResult<Value> {
        match self.eval(expr, env) {
            Ok(value @ Value::ExternalResult(_)) => Ok(value),
            Ok(value) => Ok(ExternalResult::success(value).into()),
            Err(EvalError {
                kind: EvalErrorKind::ExternalInvocationFailure { detail, .. },
                ..
            }) => Ok(ExternalResult::failure(detail).into()),
            Err(other) => Err(other),
        }
    }
}
