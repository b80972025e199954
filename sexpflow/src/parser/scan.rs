//! Delimiter pre-scan.
//!
//! One linear pass over the source that finds every structural error the
//! reader can report (unbalanced parentheses, unterminated strings, dangling
//! quotes, excessive nesting) with an exact position, and measures the
//! nesting depth so the grammar can be given enough stack.

use super::errors::{ParseError, ParseErrorKind};

pub(crate) fn is_space(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\r' | '\n')
}

pub(crate) fn is_delimiter(ch: char) -> bool {
    is_space(ch) || matches!(ch, '(' | ')' | '"' | '\'' | ';')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ScanSummary {
    /// Deepest list/quote nesting seen
    pub max_depth: usize,
}

struct OpenList {
    offset: usize,
    /// Quotes applied to this list, each one a nesting level of its own
    quotes: usize,
}

pub(crate) fn scan(source: &str, max_depth: usize) -> Result<ScanSummary, ParseError> {
    let mut open: Vec<OpenList> = Vec::new();
    let mut depth = 0usize;
    let mut summary = ScanSummary::default();
    // Quotes waiting for their datum: count and offset of the latest one
    let mut pending_quotes = 0usize;
    let mut last_quote = 0usize;

    let mut chars = source.char_indices().peekable();
    while let Some((offset, ch)) = chars.next() {
        match ch {
            ';' => {
                while let Some((_, c)) = chars.peek() {
                    if *c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '\'' => {
                pending_quotes += 1;
                last_quote = offset;
                check_depth(source, offset, depth + pending_quotes, max_depth)?;
                summary.max_depth = summary.max_depth.max(depth + pending_quotes);
            }
            '(' => {
                depth += 1 + pending_quotes;
                check_depth(source, offset, depth, max_depth)?;
                summary.max_depth = summary.max_depth.max(depth);
                open.push(OpenList {
                    offset,
                    quotes: pending_quotes,
                });
                pending_quotes = 0;
            }
            ')' => {
                if pending_quotes > 0 {
                    return Err(ParseError::at(
                        ParseErrorKind::UnmatchedParen,
                        source,
                        offset,
                        "')' closes a list before the quoted datum",
                    ));
                }
                match open.pop() {
                    Some(list) => depth -= 1 + list.quotes,
                    None => {
                        return Err(ParseError::at(
                            ParseErrorKind::UnmatchedParen,
                            source,
                            offset,
                            "')' has no matching '('",
                        ))
                    }
                }
            }
            '"' => {
                pending_quotes = 0;
                let mut terminated = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => {
                            chars.next();
                        }
                        '"' => {
                            terminated = true;
                            break;
                        }
                        _ => {}
                    }
                }
                if !terminated {
                    return Err(ParseError::at(
                        ParseErrorKind::UnterminatedString,
                        source,
                        offset,
                        "string literal is never closed",
                    ));
                }
            }
            c if is_space(c) => {}
            _ => {
                // Atom: consume up to the next delimiter
                pending_quotes = 0;
                while let Some((_, c)) = chars.peek() {
                    if is_delimiter(*c) {
                        break;
                    }
                    chars.next();
                }
            }
        }
    }

    if let Some(list) = open.last() {
        let position = super::SourcePosition::at(source, list.offset);
        return Err(ParseError::at(
            ParseErrorKind::UnexpectedEof,
            source,
            source.len(),
            format!("input ended inside the list opened at {}", position),
        ));
    }
    if pending_quotes > 0 {
        return Err(ParseError::at(
            ParseErrorKind::UnexpectedEof,
            source,
            last_quote,
            "input ended after a quote",
        ));
    }
    Ok(summary)
}

fn check_depth(source: &str, offset: usize, depth: usize, max_depth: usize) -> Result<(), ParseError> {
    if depth > max_depth {
        return Err(ParseError::at(
            ParseErrorKind::NestingTooDeep,
            source,
            offset,
            format!("nesting exceeds the limit of {} levels", max_depth),
        ));
    }
    Ok(())
}
