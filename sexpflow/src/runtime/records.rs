//! Structural field access for `get-field` and `get-path`.
//!
//! A record is an association list: a list of `(key value)` pairs whose keys
//! are strings or symbols, matched by text. Lists are also indexable by
//! integer keys, and an external result exposes `succeeded`, `payload` and
//! `diagnostic` before falling through to its payload.

use crate::runtime::error::{EvalError, EvalResult};
use crate::runtime::values::Value;

enum FieldKey<'a> {
    Name(&'a str),
    Index(i64),
}

impl<'a> FieldKey<'a> {
    fn from_value(operation: &str, key: &'a Value) -> EvalResult<Self> {
        match key {
            Value::String(s) => Ok(FieldKey::Name(s)),
            Value::Symbol(sym) => Ok(FieldKey::Name(sym.as_str())),
            Value::Integer(i) => Ok(FieldKey::Index(*i)),
            other => Err(EvalError::type_mismatch(
                operation,
                "string, symbol or integer key",
                other,
            )),
        }
    }

    fn describe(&self) -> String {
        match self {
            FieldKey::Name(name) => name.to_string(),
            FieldKey::Index(i) => i.to_string(),
        }
    }
}

/// True for a non-empty list whose every element is a `(key value)` pair
/// with a string or symbol key.
pub fn is_record(value: &Value) -> bool {
    match value {
        Value::List(items) => items.iter().all(|entry| {
            matches!(
                entry.list_items(),
                Some([Value::String(_) | Value::Symbol(_), _])
            )
        }),
        _ => false,
    }
}

/// `(get-field obj key)`
pub fn get_field(target: &Value, key: &Value) -> EvalResult<Value> {
    let field = FieldKey::from_value("get-field", key)?;
    lookup(target, &field, "get-field")?.ok_or_else(|| EvalError::field_not_found(field.describe()))
}

/// `(get-path obj path)`: `path` is a dotted string (`"a.b.0"`) or a list
/// of keys. An empty path returns `obj` itself.
pub fn get_path(target: &Value, path: &Value) -> EvalResult<Value> {
    let segments: Vec<Value> = match path {
        Value::String(text) if text.is_empty() => Vec::new(),
        Value::String(text) => text.split('.').map(segment_key).collect(),
        Value::Nil | Value::List(_) => path.list_items().unwrap_or(&[]).to_vec(),
        Value::Symbol(sym) => vec![Value::Symbol(sym.clone())],
        other => {
            return Err(EvalError::type_mismatch(
                "get-path",
                "dotted string or list of keys",
                other,
            ))
        }
    };

    let mut current = target.clone();
    let mut walked: Vec<String> = Vec::with_capacity(segments.len());
    for segment in &segments {
        let field = FieldKey::from_value("get-path", segment)?;
        walked.push(field.describe());
        current = lookup(&current, &field, "get-path")?
            .ok_or_else(|| EvalError::field_not_found(walked.join(".")))?;
    }
    Ok(current)
}

fn segment_key(segment: &str) -> Value {
    match segment.parse::<i64>() {
        Ok(index) => Value::Integer(index),
        Err(_) => Value::String(segment.to_string()),
    }
}

fn lookup(target: &Value, field: &FieldKey<'_>, operation: &str) -> EvalResult<Option<Value>> {
    match target {
        Value::ExternalResult(result) => match field {
            FieldKey::Name("succeeded") => Ok(Some(Value::Boolean(result.succeeded))),
            FieldKey::Name("payload") => Ok(Some(result.payload.clone())),
            FieldKey::Name("diagnostic") => Ok(Some(
                result
                    .diagnostic
                    .as_ref()
                    .map(|d| d.to_value())
                    .unwrap_or(Value::Nil),
            )),
            _ => lookup(&result.payload, field, operation),
        },
        Value::Nil | Value::List(_) => {
            let items = target.list_items().unwrap_or(&[]);
            Ok(match field {
                FieldKey::Index(i) => usize::try_from(*i)
                    .ok()
                    .and_then(|i| items.get(i))
                    .cloned(),
                FieldKey::Name(name) => items.iter().find_map(|entry| match entry.list_items() {
                    Some([Value::String(key), value]) if key == name => Some(value.clone()),
                    Some([Value::Symbol(key), value]) if key.as_str() == *name => Some(value.clone()),
                    _ => None,
                }),
            })
        }
        other => Err(EvalError::type_mismatch(
            operation,
            "record, list or external result",
            other,
        )),
    }
}
