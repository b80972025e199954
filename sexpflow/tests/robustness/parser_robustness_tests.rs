// sexpflow Parser Robustness Tests
// Tests for reader error kinds, positions and formatting

use sexpflow::{parse, parse_all, ParseErrorKind, Reader, ReaderConfig, Value};

fn error_kind(source: &str) -> ParseErrorKind {
    parse_all(source)
        .expect_err(&format!("expected {:?} to fail", source))
        .kind
}

/// Test unbalanced parenthesis reporting
#[test]
fn test_missing_close_paren_is_unexpected_eof() {
    let source = "(let ((x 5)) x";
    let error = parse(source).unwrap_err();
    assert_eq!(error.kind, ParseErrorKind::UnexpectedEof);
    assert_eq!(error.position.offset, source.len());
    assert!(error.message.contains("line 1, column 1"));
}

#[test]
fn test_extra_close_paren_is_unmatched() {
    let source = "(list 1 2))";
    let error = parse(source).unwrap_err();
    assert_eq!(error.kind, ParseErrorKind::UnmatchedParen);
    assert_eq!(error.position.offset, 10);

    let formatted = error.format_with_context(source);
    assert!(formatted.contains("Unmatched parenthesis"));
    println!("Unmatched parenthesis error:\n{}", formatted);
}

#[test]
fn test_unterminated_string_points_at_opening_quote() {
    let source = "(log-message \"never closed)";
    let error = parse(source).unwrap_err();
    assert_eq!(error.kind, ParseErrorKind::UnterminatedString);
    assert_eq!(error.position.column, 14);
}

#[test]
fn test_invalid_numbers() {
    for source in ["12abc", "(+ 1 2.3.4)", "99999999999999999999", "-7x", "1e999"] {
        assert_eq!(error_kind(source), ParseErrorKind::InvalidNumber, "source {:?}", source);
    }
}

#[test]
fn test_invalid_escape() {
    assert_eq!(error_kind(r#""bad \q escape""#), ParseErrorKind::InvalidEscape);
    assert_eq!(error_kind(r#""\u{110000}""#), ParseErrorKind::InvalidEscape);
}

#[test]
fn test_dangling_quote() {
    assert_eq!(error_kind("(list 'a ')"), ParseErrorKind::UnmatchedParen);
    assert_eq!(error_kind("'"), ParseErrorKind::UnexpectedEof);
}

#[test]
fn test_positions_span_lines() {
    let source = "(bind a 1)\n(bind b\n  \"oops)";
    let error = parse_all(source).unwrap_err();
    assert_eq!(error.kind, ParseErrorKind::UnterminatedString);
    assert_eq!(error.position.line, 3);
    assert_eq!(error.position.column, 3);

    let formatted = error.format_with_context(source);
    assert!(formatted.contains("3 |   \"oops)"));
}

#[test]
fn test_empty_input() {
    assert!(parse_all("").unwrap().is_empty());
    assert!(parse_all(" \n ; nothing here\n").unwrap().is_empty());
    assert_eq!(parse("").unwrap_err().kind, ParseErrorKind::UnexpectedEof);
}

#[test]
fn test_single_form_contract() {
    assert_eq!(parse("(a) (b)").unwrap_err().kind, ParseErrorKind::TrailingInput);
    assert_eq!(parse_all("(a) (b)").unwrap().len(), 2);
}

#[test]
fn test_nesting_at_and_beyond_default_limit() {
    let depth = 10_000;
    let within = format!("{}{}", "(".repeat(depth), ")".repeat(depth));
    let beyond = format!("{}{}", "(".repeat(depth + 1), ")".repeat(depth + 1));

    let value = parse(&within).expect("10,000 levels should read");
    assert!(matches!(value, Value::List(_)));
    let copy = parse(&within).unwrap();
    assert!(value == copy);
    drop(value);
    drop(copy);
    assert_eq!(parse(&beyond).unwrap_err().kind, ParseErrorKind::NestingTooDeep);
}

#[test]
fn test_configured_depth_limit() {
    let reader = Reader::new(ReaderConfig {
        max_depth: 3,
        ..ReaderConfig::default()
    });
    assert!(reader.parse("(((x)))").is_ok());
    let error = reader.parse("((('x)))").unwrap_err();
    assert_eq!(error.kind, ParseErrorKind::NestingTooDeep);
}

#[test]
fn test_reserved_literals_and_aliases() {
    assert_eq!(
        parse("(#t #f nil true false)").unwrap(),
        Value::list(vec![
            Value::Boolean(true),
            Value::Boolean(false),
            Value::Nil,
            Value::Boolean(true),
            Value::Boolean(false),
        ])
    );
}

#[test]
fn test_symbols_with_punctuation() {
    let value = parse("(set! get-field string=? -> ... + -x)").unwrap();
    let items = value.list_items().unwrap();
    assert!(items.iter().all(|item| matches!(item, Value::Symbol(_))));
    assert_eq!(items.len(), 7);
}
