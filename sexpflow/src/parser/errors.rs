//! Reader errors and source positions.

use super::Rule;
use std::fmt;

/// A location in source text. `line` and `column` are 1-based; `column`
/// counts characters, `offset` counts bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourcePosition {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl SourcePosition {
    /// Resolve a byte offset in `source` to a line/column position.
    pub fn at(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let mut line = 1;
        let mut column = 1;
        for (idx, ch) in source.char_indices() {
            if idx >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        Self {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    /// A `)` with no matching `(`, or a quote with nothing to quote before `)`
    UnmatchedParen,
    UnterminatedString,
    InvalidNumber,
    /// Unknown `\x` escape inside a string literal
    InvalidEscape,
    /// Input ended inside a list or after a quote
    UnexpectedEof,
    NestingTooDeep,
    /// More than one top-level form where exactly one was expected
    TrailingInput,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ParseErrorKind::UnmatchedParen => "Unmatched parenthesis",
            ParseErrorKind::UnterminatedString => "Unterminated string",
            ParseErrorKind::InvalidNumber => "Invalid number",
            ParseErrorKind::InvalidEscape => "Invalid escape sequence",
            ParseErrorKind::UnexpectedEof => "Unexpected end of input",
            ParseErrorKind::NestingTooDeep => "Nesting too deep",
            ParseErrorKind::TrailingInput => "Trailing input",
        };
        f.write_str(text)
    }
}

/// Error raised by the reader. Parsing stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at {position}: {message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub position: SourcePosition,
    pub message: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, position: SourcePosition, message: impl Into<String>) -> Self {
        Self {
            kind,
            position,
            message: message.into(),
        }
    }

    pub(crate) fn at(
        kind: ParseErrorKind,
        source: &str,
        offset: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::new(kind, SourcePosition::at(source, offset), message)
    }

    /// Render the error with the offending source line and a caret under
    /// the reported column.
    pub fn format_with_context(&self, source: &str) -> String {
        let line_text = source
            .lines()
            .nth(self.position.line.saturating_sub(1))
            .unwrap_or("");
        let gutter = self.position.line.to_string();
        let padding = " ".repeat(gutter.len());
        let caret_offset = " ".repeat(self.position.column.saturating_sub(1));
        format!(
            "error: {}: {}\n{padding} --> {}\n{padding} |\n{gutter} | {line_text}\n{padding} | {caret_offset}^",
            self.kind, self.message, self.position,
        )
    }
}

/// Grammar failures that slip past the pre-scan are reported against the
/// position pest stopped at.
pub(crate) fn from_pest(error: pest::error::Error<Rule>, source: &str) -> ParseError {
    let offset = match error.location {
        pest::error::InputLocation::Pos(pos) => pos,
        pest::error::InputLocation::Span((start, _)) => start,
    };
    let kind = if offset >= source.len() {
        ParseErrorKind::UnexpectedEof
    } else {
        ParseErrorKind::UnmatchedParen
    };
    ParseError::at(kind, source, offset, error.variant.message().into_owned())
}
