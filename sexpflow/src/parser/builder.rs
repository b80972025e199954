//! Build runtime values from grammar pairs.

use super::errors::{ParseError, ParseErrorKind};
use super::Rule;
use crate::config::ReaderConfig;
use crate::runtime::values::{Symbol, Value};
use crate::stack::ensure_sufficient_stack;
use pest::iterators::Pair;
use std::str::CharIndices;

pub(crate) struct ValueBuilder<'a> {
    source: &'a str,
    config: &'a ReaderConfig,
}

impl<'a> ValueBuilder<'a> {
    pub(crate) fn new(source: &'a str, config: &'a ReaderConfig) -> Self {
        Self { source, config }
    }

    pub(crate) fn build(&self, pair: Pair<'_, Rule>) -> Result<Value, ParseError> {
        ensure_sufficient_stack(|| self.build_datum(pair))
    }

    fn build_datum(&self, pair: Pair<'_, Rule>) -> Result<Value, ParseError> {
        let offset = pair.as_span().start();
        match pair.as_rule() {
            Rule::quoted => {
                let inner = pair.into_inner().next().ok_or_else(|| {
                    ParseError::at(
                        ParseErrorKind::UnexpectedEof,
                        self.source,
                        offset,
                        "quote has no datum",
                    )
                })?;
                Ok(Value::list(vec![Value::symbol("quote"), self.build(inner)?]))
            }
            Rule::list => {
                let items = pair
                    .into_inner()
                    .map(|item| self.build(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::list(items))
            }
            Rule::string => match pair.into_inner().next() {
                Some(body) => {
                    let text = unescape(body.as_str(), body.as_span().start(), self.source)?;
                    Ok(Value::String(text))
                }
                None => Ok(Value::String(String::new())),
            },
            Rule::atom => self.classify_atom(pair.as_str(), offset),
            other => Err(ParseError::at(
                ParseErrorKind::UnmatchedParen,
                self.source,
                offset,
                format!("unexpected {:?} in datum position", other),
            )),
        }
    }

    /// Reserved literal, number, or symbol - in that order.
    fn classify_atom(&self, text: &str, offset: usize) -> Result<Value, ParseError> {
        let spelled = |canonical: &str, aliases: &[String]| {
            text == canonical || aliases.iter().any(|alias| alias == text)
        };
        if spelled("nil", &self.config.nil_spellings) {
            return Ok(Value::Nil);
        }
        if spelled("#t", &self.config.true_spellings) {
            return Ok(Value::Boolean(true));
        }
        if spelled("#f", &self.config.false_spellings) {
            return Ok(Value::Boolean(false));
        }
        if looks_numeric(text) {
            return parse_number(text).ok_or_else(|| {
                ParseError::at(
                    ParseErrorKind::InvalidNumber,
                    self.source,
                    offset,
                    format!("'{}' is not a valid number", text),
                )
            });
        }
        Ok(Value::Symbol(Symbol::new(text)))
    }
}

/// A token is numeric if, after an optional sign, it starts with a digit or
/// with `.` followed by a digit.
fn looks_numeric(text: &str) -> bool {
    let body = text.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(text);
    let mut chars = body.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('.') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if text.contains(|c: char| matches!(c, '.' | 'e' | 'E')) {
        text.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Value::Float)
    } else {
        text.parse::<i64>().ok().map(Value::Integer)
    }
}

fn unescape(body: &str, base_offset: usize, source: &str) -> Result<String, ParseError> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.char_indices();
    while let Some((idx, ch)) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let invalid = |message: String| {
            ParseError::at(ParseErrorKind::InvalidEscape, source, base_offset + idx, message)
        };
        let Some((_, escape)) = chars.next() else {
            return Err(ParseError::at(
                ParseErrorKind::UnterminatedString,
                source,
                base_offset + idx,
                "string ends inside an escape sequence",
            ));
        };
        let decoded = match escape {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            'u' => parse_unicode_escape(&mut chars)
                .ok_or_else(|| invalid("malformed unicode escape, expected \\u{XXXX}".to_string()))?,
            other => return Err(invalid(format!("unknown escape '\\{}'", other))),
        };
        out.push(decoded);
    }
    Ok(out)
}

fn parse_unicode_escape(chars: &mut CharIndices<'_>) -> Option<char> {
    if chars.next()?.1 != '{' {
        return None;
    }
    let mut hex = String::new();
    for (_, c) in chars.by_ref() {
        if c == '}' {
            return u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32);
        }
        if hex.len() >= 6 || !c.is_ascii_hexdigit() {
            return None;
        }
        hex.push(c);
    }
    None
}
