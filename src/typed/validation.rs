//! Errors raised when a value does not conform to its schema type.

use std::fmt;
use thiserror::Error;

use crate::fieldpath::Path;

/// A single schema violation.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("{path}: type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("{path}: unknown field: {field}")]
    UnknownField { path: String, field: String },

    #[error("{path}: missing required field: {field}")]
    MissingField { path: String, field: String },

    #[error("{path}: duplicate entries for key {key}")]
    DuplicateKey { path: String, key: String },

    #[error("{path}: {message}")]
    InvalidValue { path: String, message: String },

    #[error("{message}")]
    SchemaError { message: String },
}

impl ValidationError {
    pub fn type_mismatch(path: impl Into<String>, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        ValidationError::TypeMismatch {
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn unknown_field(path: impl Into<String>, field: impl Into<String>) -> Self {
        ValidationError::UnknownField {
            path: path.into(),
            field: field.into(),
        }
    }

    pub fn missing_field(path: impl Into<String>, field: impl Into<String>) -> Self {
        ValidationError::MissingField {
            path: path.into(),
            field: field.into(),
        }
    }

    pub fn duplicate_key(path: impl Into<String>, key: impl Into<String>) -> Self {
        ValidationError::DuplicateKey {
            path: path.into(),
            key: key.into(),
        }
    }

    pub fn invalid_value(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn schema_error(message: impl Into<String>) -> Self {
        ValidationError::SchemaError {
            message: message.into(),
        }
    }

    /// Relocates an error raised without knowing where it happened.
    pub fn at(self, path: &Path) -> Self {
        let located = path.to_string();
        match self {
            ValidationError::MissingField { field, .. } => ValidationError::MissingField { path: located, field },
            ValidationError::InvalidValue { message, .. } => ValidationError::InvalidValue { path: located, message },
            other => other,
        }
    }
}

/// All violations found in one value.
#[derive(Debug, Clone, Default)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        ValidationErrors::default()
    }

    pub fn from_error(error: ValidationError) -> Self {
        ValidationErrors { errors: vec![error] }
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        write!(f, "{}", messages.join("\n"))
    }
}

impl std::error::Error for ValidationErrors {}
