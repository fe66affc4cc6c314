//! Crate-level error type.

use thiserror::Error;

use crate::fieldpath::SerializeError;
use crate::merge::ApplyError;
use crate::typed::ParseError;

/// Errors returned by the diff and normalization engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The diff configuration failed validation.
    #[error("diffConfig validation error: {0}")]
    Config(String),

    /// A normalizer could not be built or failed while running.
    #[error("{context}: {source}")]
    Normalizer {
        context: String,
        #[source]
        source: Box<Error>,
    },

    /// A structural diff could not be computed.
    #[error("{context}: {source}")]
    Diff {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("left and right arrays have mismatched lengths")]
    MismatchedLengths,

    #[error("unexpected diff result of {0} length, expected 1")]
    UnexpectedResultCount(usize),

    #[error("unexpected state: {0}")]
    InvalidState(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The state cache failed to load or store an entry.
    #[error("state cache error: {0}")]
    Cache(String),

    #[error("failed to parse managed fields: {0}")]
    FieldSet(#[from] SerializeError),

    #[error("failed to parse schema: {0}")]
    Schema(#[from] ParseError),

    #[error("error while running updater.apply: {0}")]
    Apply(#[from] ApplyError),

    /// A field could not be remarshaled through its registered known type.
    #[error("error normalizing {path} as {type_name}: {message}")]
    KnownType {
        path: String,
        type_name: String,
        message: String,
    },

    #[error("failed to build remove patch for json pointer '{pointer}': {message}")]
    Pointer { pointer: String, message: String },

    #[error("failed to compile jq expression '{expression}': {message}")]
    Jq { expression: String, message: String },

    #[error("invalid glob pattern '{pattern}': {message}")]
    Glob { pattern: String, message: String },

    #[error("override key must be <group>/<kind> or <kind>, got: '{0}'")]
    OverrideKey(String),

    #[error("object is not a map, got {0}")]
    NotAnObject(&'static str),
}

impl Error {
    /// Wraps an error raised while building or running a normalizer.
    pub fn normalizer(context: impl Into<String>, source: Error) -> Self {
        Error::Normalizer {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Wraps an error raised while computing a diff.
    pub fn diff(context: impl Into<String>, source: Error) -> Self {
        Error::Diff {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_wrapped_error_keeps_source() {
        let err = Error::normalizer("error building ignore normalizer", Error::MismatchedLengths);
        assert_eq!(
            err.to_string(),
            "error building ignore normalizer: left and right arrays have mismatched lengths"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_override_key_message() {
        let err = Error::OverrideKey("a/b/c".into());
        assert_eq!(
            err.to_string(),
            "override key must be <group>/<kind> or <kind>, got: 'a/b/c'"
        );
    }
}
