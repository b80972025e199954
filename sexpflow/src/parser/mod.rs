//! Reader: source text to symbolic values.
//!
//! Reading has no evaluation semantics. Lists become [`Value::List`] (the
//! empty list reads as [`Value::Nil`]), `'x` desugars to `(quote x)`, and
//! bare tokens become numbers, reserved literals or symbols.

use crate::config::ReaderConfig;
use crate::runtime::values::Value;
use crate::stack::with_nesting_stack;
use pest::Parser;

mod builder;
pub mod errors;
mod scan;

pub use errors::{ParseError, ParseErrorKind, SourcePosition};

use builder::ValueBuilder;

#[derive(pest_derive::Parser)]
#[grammar = "sexpflow.pest"] // Path relative to src/
pub struct SexpParser;

/// Parse exactly one top-level expression with the default reader settings.
pub fn parse(input: &str) -> Result<Value, ParseError> {
    Reader::default().parse(input)
}

/// Parse every top-level form. Empty input yields an empty sequence.
pub fn parse_all(input: &str) -> Result<Vec<Value>, ParseError> {
    Reader::default().parse_all(input)
}

/// A configured reader.
#[derive(Debug, Clone, Default)]
pub struct Reader {
    config: ReaderConfig,
}

impl Reader {
    pub fn new(config: ReaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn parse_all(&self, input: &str) -> Result<Vec<Value>, ParseError> {
        Ok(self
            .parse_spanned(input)?
            .into_iter()
            .map(|(_, value)| value)
            .collect())
    }

    pub fn parse(&self, input: &str) -> Result<Value, ParseError> {
        let mut forms = self.parse_spanned(input)?.into_iter();
        let Some((_, first)) = forms.next() else {
            return Err(ParseError::at(
                ParseErrorKind::UnexpectedEof,
                input,
                input.len(),
                "expected an expression, found end of input",
            ));
        };
        if let Some((offset, _)) = forms.next() {
            return Err(ParseError::at(
                ParseErrorKind::TrailingInput,
                input,
                offset,
                "expected a single expression",
            ));
        }
        Ok(first)
    }

    /// Top-level forms with the byte offset each one starts at.
    fn parse_spanned(&self, input: &str) -> Result<Vec<(usize, Value)>, ParseError> {
        let summary = scan::scan(input, self.config.max_depth)?;
        let pairs = with_nesting_stack(summary.max_depth, || {
            SexpParser::parse(Rule::program, input)
        })
        .map_err(|e| errors::from_pest(e, input))?;

        let builder = ValueBuilder::new(input, &self.config);
        pairs
            .flat_map(|program| program.into_inner())
            .filter(|pair| pair.as_rule() != Rule::EOI)
            .map(|pair| {
                let offset = pair.as_span().start();
                builder.build(pair).map(|value| (offset, value))
            })
            .collect()
    }
}
