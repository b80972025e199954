//! sexpflow Standard Library
//!
//! Built-in procedures, callable like any closure. Primitives receive their
//! arguments already evaluated and never touch an environment. The library
//! is organized into categories:
//! - Arithmetic functions
//! - Comparison and equality functions
//! - List functions
//! - String functions
//! - Type predicate functions
//! - Utility functions (logging)

use crate::runtime::environment::Environment;
use crate::runtime::error::{EvalError, EvalErrorKind, EvalResult};
use crate::runtime::host_interface::LogSink;
use crate::runtime::values::{Arity, Primitive, PrimitiveFn, Symbol, Value};
use std::cmp::Ordering;
use std::rc::Rc;

/// What a primitive may reach besides its arguments.
pub struct PrimitiveContext<'a> {
    pub log_sink: &'a dyn LogSink,
}

/// The Standard Library for the sexpflow runtime.
///
/// Responsible for creating the root environment and loading all the
/// built-in procedures into it.
pub struct StandardLibrary;

impl StandardLibrary {
    /// Creates a new root environment populated with every primitive.
    pub fn create_global_environment() -> Environment {
        let env = Environment::new();
        Self::load_arithmetic_functions(&env);
        Self::load_comparison_functions(&env);
        Self::load_list_functions(&env);
        Self::load_string_functions(&env);
        Self::load_type_predicate_functions(&env);
        Self::load_utility_functions(&env);
        env
    }

    fn define(env: &Environment, name: &'static str, arity: Arity, func: PrimitiveFn) {
        env.define(
            Symbol::new(name),
            Value::Primitive(Rc::new(Primitive { name, arity, func })),
        );
    }

    fn load_arithmetic_functions(env: &Environment) {
        Self::define(env, "+", Arity::Variadic(0), Self::add);
        Self::define(env, "-", Arity::Variadic(1), Self::subtract);
        Self::define(env, "*", Arity::Variadic(0), Self::multiply);
        Self::define(env, "/", Arity::Variadic(1), Self::divide);
    }

    fn load_comparison_functions(env: &Environment) {
        Self::define(env, "=", Arity::Variadic(2), Self::numeric_equal);
        Self::define(env, "<", Arity::Variadic(2), Self::less_than);
        Self::define(env, ">", Arity::Variadic(2), Self::greater_than);
        Self::define(env, "<=", Arity::Variadic(2), Self::less_equal);
        Self::define(env, ">=", Arity::Variadic(2), Self::greater_equal);
        Self::define(env, "eq?", Arity::Fixed(2), Self::equal);
        Self::define(env, "equal?", Arity::Fixed(2), Self::equal);
        Self::define(env, "string=?", Arity::Fixed(2), Self::string_equal);
        Self::define(env, "not", Arity::Fixed(1), Self::not);
    }

    fn load_list_functions(env: &Environment) {
        Self::define(env, "length", Arity::Fixed(1), Self::length);
        Self::define(env, "first", Arity::Fixed(1), Self::first);
        Self::define(env, "rest", Arity::Fixed(1), Self::rest);
        Self::define(env, "nth", Arity::Fixed(2), Self::nth);
        Self::define(env, "cons", Arity::Fixed(2), Self::cons);
        Self::define(env, "append", Arity::Variadic(0), Self::append);
    }

    fn load_string_functions(env: &Environment) {
        Self::define(env, "string-append", Arity::Variadic(0), Self::string_append);
        Self::define(env, "string-length", Arity::Fixed(1), Self::string_length);
        Self::define(env, "to-string", Arity::Fixed(1), Self::to_string);
    }

    fn load_type_predicate_functions(env: &Environment) {
        Self::define(env, "null?", Arity::Fixed(1), Self::is_null);
        Self::define(env, "nil?", Arity::Fixed(1), Self::is_null);
        Self::define(env, "number?", Arity::Fixed(1), Self::is_number);
        Self::define(env, "integer?", Arity::Fixed(1), Self::is_integer);
        Self::define(env, "string?", Arity::Fixed(1), Self::is_string);
        Self::define(env, "symbol?", Arity::Fixed(1), Self::is_symbol);
        Self::define(env, "list?", Arity::Fixed(1), Self::is_list);
        Self::define(env, "boolean?", Arity::Fixed(1), Self::is_boolean);
        Self::define(env, "procedure?", Arity::Fixed(1), Self::is_procedure);
        Self::define(env, "external-result?", Arity::Fixed(1), Self::is_external_result);
    }

    fn load_utility_functions(env: &Environment) {
        Self::define(env, "log-message", Arity::Variadic(0), Self::log_message);
    }

    // Arithmetic

    fn add(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        args.iter().try_fold(Value::Integer(0), |acc, arg| {
            arithmetic("+", &acc, arg, i64::checked_add, |a, b| a + b)
        })
    }

    fn subtract(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        match args {
            [only] => arithmetic("-", &Value::Integer(0), only, i64::checked_sub, |a, b| a - b),
            [head, tail @ ..] => tail.iter().try_fold(number("-", head)?, |acc, arg| {
                arithmetic("-", &acc, arg, i64::checked_sub, |a, b| a - b)
            }),
            [] => Err(EvalError::arity("-", Arity::Variadic(1), 0)),
        }
    }

    fn multiply(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        args.iter().try_fold(Value::Integer(1), |acc, arg| {
            arithmetic("*", &acc, arg, i64::checked_mul, |a, b| a * b)
        })
    }

    /// Integer division stays exact when it can; otherwise the result is a
    /// float. A zero divisor of either kind is an error.
    fn divide(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        match args {
            [only] => divide_pair(&Value::Integer(1), only),
            [head, tail @ ..] => tail
                .iter()
                .try_fold(number("/", head)?, |acc, arg| divide_pair(&acc, arg)),
            [] => Err(EvalError::arity("/", Arity::Variadic(1), 0)),
        }
    }

    // Comparison

    fn numeric_equal(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        compare_chain("=", args, |ord| ord == Ordering::Equal)
    }

    fn less_than(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        compare_chain("<", args, |ord| ord == Ordering::Less)
    }

    fn greater_than(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        compare_chain(">", args, |ord| ord == Ordering::Greater)
    }

    fn less_equal(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        compare_chain("<=", args, |ord| ord != Ordering::Greater)
    }

    fn greater_equal(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        compare_chain(">=", args, |ord| ord != Ordering::Less)
    }

    /// Structural equality. Integers and floats are distinct kinds here;
    /// use `=` for numeric comparison.
    fn equal(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        Ok(Value::Boolean(args[0] == args[1]))
    }

    fn string_equal(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        let a = string_arg("string=?", &args[0])?;
        let b = string_arg("string=?", &args[1])?;
        Ok(Value::Boolean(a == b))
    }

    fn not(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        Ok(Value::Boolean(!args[0].is_truthy()))
    }

    // Lists

    fn length(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        let items = list_arg("length", &args[0])?;
        Ok(Value::Integer(items.len() as i64))
    }

    fn first(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        let items = list_arg("first", &args[0])?;
        Ok(items.first().cloned().unwrap_or(Value::Nil))
    }

    fn rest(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        let items = list_arg("rest", &args[0])?;
        Ok(match items.split_first() {
            Some((_, tail)) => Value::list(tail.to_vec()),
            None => Value::Nil,
        })
    }

    fn nth(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        let items = list_arg("nth", &args[0])?;
        let index = match &args[1] {
            Value::Integer(i) => *i,
            other => return Err(EvalError::type_mismatch("nth", "integer", other)),
        };
        usize::try_from(index)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .ok_or_else(|| EvalError::field_not_found(index.to_string()))
    }

    fn cons(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        let tail = list_arg("cons", &args[1])?;
        let mut items = Vec::with_capacity(tail.len() + 1);
        items.push(args[0].clone());
        items.extend_from_slice(tail);
        Ok(Value::list(items))
    }

    fn append(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        let mut items = Vec::new();
        for arg in args {
            items.extend_from_slice(list_arg("append", arg)?);
        }
        Ok(Value::list(items))
    }

    // Strings

    fn string_append(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        let mut out = String::new();
        for arg in args {
            out.push_str(string_arg("string-append", arg)?);
        }
        Ok(Value::String(out))
    }

    fn string_length(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        let s = string_arg("string-length", &args[0])?;
        Ok(Value::Integer(s.chars().count() as i64))
    }

    fn to_string(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        Ok(Value::String(display_raw(&args[0])))
    }

    // Type predicates

    fn is_null(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        Ok(Value::Boolean(args[0].is_nil()))
    }

    fn is_number(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        Ok(Value::Boolean(matches!(args[0], Value::Integer(_) | Value::Float(_))))
    }

    fn is_integer(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        Ok(Value::Boolean(matches!(args[0], Value::Integer(_))))
    }

    fn is_string(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        Ok(Value::Boolean(matches!(args[0], Value::String(_))))
    }

    fn is_symbol(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        Ok(Value::Boolean(matches!(args[0], Value::Symbol(_))))
    }

    fn is_list(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        Ok(Value::Boolean(matches!(args[0], Value::List(_) | Value::Nil)))
    }

    fn is_boolean(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        Ok(Value::Boolean(matches!(args[0], Value::Boolean(_))))
    }

    fn is_procedure(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        Ok(Value::Boolean(matches!(
            args[0],
            Value::Closure(_) | Value::Primitive(_)
        )))
    }

    fn is_external_result(args: &[Value], _ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        Ok(Value::Boolean(matches!(args[0], Value::ExternalResult(_))))
    }

    // Utility

    /// `(log-message arg...)`: strings are written without quotes, other
    /// values in their printed form, separated by spaces.
    fn log_message(args: &[Value], ctx: &PrimitiveContext<'_>) -> EvalResult<Value> {
        let message = args.iter().map(display_raw).collect::<Vec<_>>().join(" ");
        ctx.log_sink.log(&message);
        Ok(Value::Nil)
    }
}

fn display_raw(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn string_arg<'a>(operation: &str, value: &'a Value) -> EvalResult<&'a str> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(EvalError::type_mismatch(operation, "string", other)),
    }
}

fn list_arg<'a>(operation: &str, value: &'a Value) -> EvalResult<&'a [Value]> {
    value
        .list_items()
        .ok_or_else(|| EvalError::type_mismatch(operation, "list", value))
}

fn number(operation: &str, value: &Value) -> EvalResult<Value> {
    match value {
        Value::Integer(_) | Value::Float(_) => Ok(value.clone()),
        other => Err(EvalError::type_mismatch(operation, "number", other)),
    }
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::Integer(i) => *i as f64,
        Value::Float(f) => *f,
        _ => f64::NAN,
    }
}

fn finite(operation: &str, result: f64) -> EvalResult<Value> {
    if result.is_finite() {
        Ok(Value::Float(result))
    } else {
        Err(EvalError::overflow(operation))
    }
}

/// Combine two numbers. Integer pairs use checked arithmetic; a float on
/// either side promotes the operation to floats.
fn arithmetic(
    operation: &str,
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> EvalResult<Value> {
    let left = number(operation, left)?;
    let right = number(operation, right)?;
    match (&left, &right) {
        (Value::Integer(a), Value::Integer(b)) => int_op(*a, *b)
            .map(Value::Integer)
            .ok_or_else(|| EvalError::overflow(operation)),
        _ => finite(operation, float_op(as_float(&left), as_float(&right))),
    }
}

fn divide_pair(left: &Value, right: &Value) -> EvalResult<Value> {
    let left = number("/", left)?;
    let right = number("/", right)?;
    match (&left, &right) {
        (_, Value::Integer(0)) => Err(EvalError::new(EvalErrorKind::DivisionByZero)),
        (_, Value::Float(f)) if *f == 0.0 => Err(EvalError::new(EvalErrorKind::DivisionByZero)),
        (Value::Integer(a), Value::Integer(b)) => match a.checked_rem(*b) {
            Some(0) => a
                .checked_div(*b)
                .map(Value::Integer)
                .ok_or_else(|| EvalError::overflow("/")),
            Some(_) => finite("/", *a as f64 / *b as f64),
            None => Err(EvalError::overflow("/")),
        },
        _ => finite("/", as_float(&left) / as_float(&right)),
    }
}

fn compare_numbers(operation: &str, left: &Value, right: &Value) -> EvalResult<Ordering> {
    let left = number(operation, left)?;
    let right = number(operation, right)?;
    Ok(match (&left, &right) {
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::Integer(a), Value::Float(b)) => compare_int_float(*a, *b),
        (Value::Float(a), Value::Integer(b)) => compare_int_float(*b, *a).reverse(),
        _ => as_float(&left)
            .partial_cmp(&as_float(&right))
            .unwrap_or(Ordering::Less),
    })
}

/// Exact ordering of an integer against a float. Converting the integer
/// to `f64` would round anything beyond 2^53.
fn compare_int_float(int: i64, float: f64) -> Ordering {
    // 2^63, the first float above every i64
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if float.is_nan() {
        return Ordering::Less;
    }
    if float >= LIMIT {
        return Ordering::Less;
    }
    if float < -LIMIT {
        return Ordering::Greater;
    }
    let whole = float.trunc();
    // In range and integral, so the cast is exact
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => whole.partial_cmp(&float).unwrap_or(Ordering::Equal),
        unequal => unequal,
    }
}

/// `(< a b c)` holds when every adjacent pair does.
fn compare_chain(
    operation: &str,
    args: &[Value],
    holds: fn(Ordering) -> bool,
) -> EvalResult<Value> {
    let mut result = true;
    for pair in args.windows(2) {
        // Type-check every argument even after the chain is decided
        let ordering = compare_numbers(operation, &pair[0], &pair[1])?;
        result = result && holds(ordering);
    }
    Ok(Value::Boolean(result))
}
