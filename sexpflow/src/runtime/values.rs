// Runtime value system for sexpflow
// The reader produces these values directly; code is data.

use crate::runtime::environment::Environment;
use crate::runtime::error::{EvalError, EvalResult};
use crate::runtime::stdlib::PrimitiveContext;
use crate::stack::ensure_sufficient_stack;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// An identifier. Equality and hashing are by name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Rc<str>);

impl Symbol {
    pub fn new(name: &str) -> Self {
        Symbol(Rc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::new(name)
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Symbol(Symbol),
    /// Never empty: the empty list is `Nil`.
    List(Rc<ValueList>),
    Closure(Rc<Closure>),
    Primitive(Rc<Primitive>),
    ExternalResult(Rc<ExternalResult>),
}

impl Value {
    /// Build a list, normalizing the empty list to `Nil`.
    pub fn list(items: Vec<Value>) -> Value {
        if items.is_empty() {
            Value::Nil
        } else {
            Value::List(Rc::new(ValueList(items.into_boxed_slice())))
        }
    }

    pub fn symbol(name: &str) -> Value {
        Value::Symbol(Symbol::new(name))
    }

    pub fn string(text: impl Into<String>) -> Value {
        Value::String(text.into())
    }

    /// Only `#f` and `nil` are false.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false) | Value::Nil)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Elements of a list; `Nil` is the empty list.
    pub fn list_items(&self) -> Option<&[Value]> {
        match self {
            Value::Nil => Some(&[]),
            Value::List(items) => Some(&items[..]),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Symbol(sym) => Some(sym),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::List(_) => "list",
            Value::Closure(_) => "closure",
            Value::Primitive(_) => "primitive",
            Value::ExternalResult(_) => "external-result",
        }
    }

    /// Convert a JSON document delivered by an external system. Objects
    /// become association-list records with string keys.
    pub fn from_json(json: &serde_json::Value) -> Value {
        ensure_sufficient_stack(|| match json {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Nil),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::list(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::list(
                map.iter()
                    .map(|(key, value)| {
                        Value::list(vec![Value::String(key.clone()), Value::from_json(value)])
                    })
                    .collect(),
            ),
        })
    }

    /// Convert to JSON for an external system. Records become objects;
    /// procedures have no JSON form.
    pub fn to_json(&self) -> EvalResult<serde_json::Value> {
        ensure_sufficient_stack(|| match self {
            Value::Nil => Ok(serde_json::Value::Null),
            Value::Boolean(b) => Ok(serde_json::Value::Bool(*b)),
            Value::Integer(i) => Ok(serde_json::Value::from(*i)),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| EvalError::type_mismatch("to-json", "finite number", self)),
            Value::String(s) => Ok(serde_json::Value::String(s.clone())),
            Value::Symbol(sym) => Ok(serde_json::Value::String(sym.to_string())),
            Value::List(items) => {
                if crate::runtime::records::is_record(self) {
                    let mut map = serde_json::Map::new();
                    for entry in items.iter() {
                        if let Some([key, value]) = entry.list_items() {
                            let key = match key {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            };
                            map.insert(key, value.to_json()?);
                        }
                    }
                    Ok(serde_json::Value::Object(map))
                } else {
                    items
                        .iter()
                        .map(Value::to_json)
                        .collect::<EvalResult<Vec<_>>>()
                        .map(serde_json::Value::Array)
                }
            }
            Value::ExternalResult(result) => {
                let mut map = serde_json::Map::new();
                map.insert("succeeded".to_string(), serde_json::Value::Bool(result.succeeded));
                map.insert("payload".to_string(), result.payload.to_json()?);
                let diagnostic = match &result.diagnostic {
                    Some(d) => serde_json::to_value(d).unwrap_or(serde_json::Value::Null),
                    None => serde_json::Value::Null,
                };
                map.insert("diagnostic".to_string(), diagnostic);
                Ok(serde_json::Value::Object(map))
            }
            Value::Closure(_) | Value::Primitive(_) => {
                Err(EvalError::type_mismatch("to-json", "data value", self))
            }
        })
    }
}

/// Structural equality without native recursion, so nesting up to the
/// reader's bound compares safely. Procedures compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];
        while let Some((left, right)) = pending.pop() {
            match (left, right) {
                (Value::List(a), Value::List(b)) => {
                    if Rc::ptr_eq(a, b) {
                        continue;
                    }
                    if a.len() != b.len() {
                        return false;
                    }
                    pending.extend(a.iter().zip(b.iter()));
                }
                (Value::ExternalResult(a), Value::ExternalResult(b)) => {
                    if a.succeeded != b.succeeded || a.diagnostic != b.diagnostic {
                        return false;
                    }
                    pending.push((&a.payload, &b.payload));
                }
                (Value::Nil, Value::Nil) => {}
                (Value::Boolean(a), Value::Boolean(b)) if a == b => {}
                (Value::Integer(a), Value::Integer(b)) if a == b => {}
                (Value::Float(a), Value::Float(b)) if a == b => {}
                (Value::String(a), Value::String(b)) if a == b => {}
                (Value::Symbol(a), Value::Symbol(b)) if a == b => {}
                (Value::Closure(a), Value::Closure(b)) if Rc::ptr_eq(a, b) => {}
                (Value::Primitive(a), Value::Primitive(b)) if a == b => {}
                _ => return false,
            }
        }
        true
    }
}

/// Backing storage of a non-empty list.
///
/// Dropping releases nested lists from a work stack instead of recursing,
/// so a deeply nested form can be dropped on an ordinary thread.
pub struct ValueList(Box<[Value]>);

impl std::ops::Deref for ValueList {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        &self.0
    }
}

impl fmt::Debug for ValueList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl Drop for ValueList {
    fn drop(&mut self) {
        let mut pending: Vec<Value> = std::mem::take(&mut self.0).into_vec();
        while let Some(value) = pending.pop() {
            if let Value::List(list) = value {
                // Shared lists are only released by their last owner
                if let Ok(mut unique) = Rc::try_unwrap(list) {
                    pending.extend(std::mem::take(&mut unique.0).into_vec());
                }
            }
        }
    }
}

impl From<ExternalResult> for Value {
    fn from(result: ExternalResult) -> Self {
        Value::ExternalResult(Rc::new(result))
    }
}

/// Printer. Data values print as source that reads back to an equal value;
/// procedures and external results print as unreadable `#<...>` forms.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(true) => write!(f, "#t"),
            Value::Boolean(false) => write!(f, "#f"),
            Value::Integer(i) => write!(f, "{}", i),
            // Debug formatting always keeps a '.' or an exponent
            Value::Float(fl) => write!(f, "{:?}", fl),
            Value::String(s) => write_escaped(f, s),
            Value::Symbol(s) => write!(f, "{}", s),
            Value::List(items) => ensure_sufficient_stack(|| {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }),
            Value::Closure(closure) => write!(f, "{}", closure),
            Value::Primitive(p) => write!(f, "#<primitive {}>", p.name),
            Value::ExternalResult(result) => match &result.diagnostic {
                _ if result.succeeded => write!(f, "#<external-result ok {}>", result.payload),
                Some(diagnostic) => write!(f, "#<external-result failed {}>", diagnostic),
                None => write!(f, "#<external-result failed>"),
            },
        }
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in s.chars() {
        match ch {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            '\0' => write!(f, "\\0")?,
            c if c.is_control() => write!(f, "\\u{{{:x}}}", c as u32)?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "\"")
}

/// A procedure created by `lambda`.
pub struct Closure {
    pub params: Vec<Symbol>,
    /// Unevaluated body expression
    pub body: Value,
    /// Defining environment, fixed at creation
    pub env: Environment,
}

impl Closure {
    pub fn new(params: Vec<Symbol>, body: Value, env: Environment) -> Self {
        Closure { params, body, env }
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("params", &self.params)
            .field("body", &self.body)
            .finish()
    }
}

impl fmt::Display for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<closure (")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ")>")
    }
}

impl PartialEq for Closure {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    Variadic(usize), // Minimum number of arguments
    Range(usize, usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Arity::Fixed(n) => count == *n,
            Arity::Variadic(min) => count >= *min,
            Arity::Range(min, max) => count >= *min && count <= *max,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Fixed(n) => write!(f, "{}", n),
            Arity::Variadic(min) => write!(f, "at least {}", min),
            Arity::Range(min, max) => write!(f, "{}-{}", min, max),
        }
    }
}

pub type PrimitiveFn = fn(&[Value], &PrimitiveContext<'_>) -> EvalResult<Value>;

/// A built-in procedure.
pub struct Primitive {
    pub name: &'static str,
    pub arity: Arity,
    pub func: PrimitiveFn,
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Primitive")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

impl PartialEq for Primitive {
    fn eq(&self, other: &Self) -> bool {
        // Compare by name and arity, not by function pointer
        self.name == other.name && self.arity == other.arity
    }
}

/// Structured error reported by an external system, carried verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Diagnostic {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// The diagnostic as a record, for `get-field` access from workflows.
    pub fn to_value(&self) -> Value {
        let mut entries = vec![
            Value::list(vec![Value::string("code"), Value::String(self.code.clone())]),
            Value::list(vec![Value::string("message"), Value::String(self.message.clone())]),
        ];
        if let Some(details) = &self.details {
            entries.push(Value::list(vec![Value::string("details"), Value::from_json(details)]));
        }
        Value::list(entries)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Outcome of a delegated task/tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalResult {
    pub succeeded: bool,
    pub payload: Value,
    pub diagnostic: Option<Diagnostic>,
}

impl ExternalResult {
    pub fn success(payload: Value) -> Self {
        Self {
            succeeded: true,
            payload,
            diagnostic: None,
        }
    }

    pub fn failure(diagnostic: Diagnostic) -> Self {
        Self {
            succeeded: false,
            payload: Value::Nil,
            diagnostic: Some(diagnostic),
        }
    }
}
