//! Evaluator configuration
//!
//! Every field has a default, so a TOML file only needs to name the values it
//! overrides:
//!
//! ```toml
//! [reader]
//! max_depth = 2000
//! true_spellings = ["true", "yes"]
//!
//! [limits]
//! max_call_depth = 128
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Top-level configuration for a [`crate::Runtime`].
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub reader: ReaderConfig,
    pub limits: EvaluationLimits,
}

impl EvaluatorConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
}

/// Reader settings.
///
/// The canonical spellings `nil`, `#t` and `#f` are always recognized; the
/// lists below add aliases. An alias shadows any symbol with the same name.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReaderConfig {
    /// Maximum list/quote nesting accepted before `NestingTooDeep`.
    pub max_depth: usize,
    pub nil_spellings: Vec<String>,
    pub true_spellings: Vec<String>,
    pub false_spellings: Vec<String>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_depth: 10_000,
            nil_spellings: Vec::new(),
            true_spellings: vec!["true".to_string()],
            false_spellings: vec!["false".to_string()],
        }
    }
}

/// Ceilings that keep runaway workflows from hanging or overflowing.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvaluationLimits {
    /// Maximum nesting of closure applications
    pub max_call_depth: usize,
    /// Maximum evaluation steps per top-level evaluation
    pub max_steps: usize,
    /// Maximum expression nesting during evaluation
    pub max_eval_depth: usize,
}

impl Default for EvaluationLimits {
    fn default() -> Self {
        Self {
            max_call_depth: 512,
            max_steps: 1_000_000,
            max_eval_depth: 10_000,
        }
    }
}
