//! MR-000: Errors for the loading layers.
//!
//! The analyzer itself never fails; these cover reading module files and
//! provider schemas, and parsing addresses supplied by a user.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading configuration or schemas.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("YAML parse error in {origin}: {source}")]
    Yaml {
        origin: String,
        source: serde_yaml_ng::Error,
    },

    #[error("schema parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate {kind} \"{name}\" in {origin}")]
    Duplicate {
        kind: &'static str,
        name: String,
        origin: String,
    },

    #[error("invalid declaration \"{name}\" in {origin}: {message}")]
    Declaration {
        name: String,
        origin: String,
        message: String,
    },

    #[error("module source cycle: {0}")]
    ModuleCycle(String),

    #[error("glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Failure to parse an address, reference, or provider source string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {what} \"{input}\": {reason}")]
pub struct ParseError {
    pub what: &'static str,
    pub input: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(what: &'static str, input: &str, reason: impl Into<String>) -> Self {
        Self {
            what,
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias for results using `LoadError`.
pub type Result<T> = std::result::Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mr000_parse_error_display() {
        let e = ParseError::new("reference", "var", "missing name");
        assert_eq!(e.to_string(), "invalid reference \"var\": missing name");
    }

    #[test]
    fn test_mr000_duplicate_display() {
        let e = LoadError::Duplicate {
            kind: "output",
            name: "vpc_id".to_string(),
            origin: "net/outputs.yaml".to_string(),
        };
        assert!(e.to_string().contains("duplicate output \"vpc_id\""));
    }

    #[test]
    fn test_mr000_parse_error_converts() {
        let e: LoadError = ParseError::new("provider source", "a/b/c/d", "too many parts").into();
        assert!(e.to_string().contains("too many parts"));
    }
}
