//! Parser for creating typed values from schemas and objects.

use std::sync::Arc;
use thiserror::Error;

use super::typed_value::{as_typed, TypedValue};
use super::validation::ValidationErrors;
use crate::schema::{deduced_schema, Schema, TypeRef, UNTYPED_DEDUCED};
use crate::value::Value;

/// Parser holds a schema parsed from YAML.
#[derive(Debug, Clone)]
pub struct Parser {
    schema: Arc<Schema>,
}

impl Parser {
    /// Creates a new parser from a YAML schema string.
    pub fn new(schema_yaml: &str) -> Result<Parser, ParseError> {
        let schema: Schema =
            serde_yaml::from_str(schema_yaml).map_err(|e| ParseError::Schema(e.to_string()))?;
        Ok(Parser {
            schema: Arc::new(schema),
        })
    }

    pub fn type_names(&self) -> Vec<&str> {
        self.schema.types.iter().map(|t| t.name.as_str()).collect()
    }

    /// Returns a ParseableType for the named type.
    pub fn type_by_name(&self, name: &str) -> ParseableType {
        ParseableType {
            schema: Arc::clone(&self.schema),
            type_ref: TypeRef::named(name),
        }
    }
}

/// ParseableType produces typed values of one schema type.
#[derive(Debug, Clone)]
pub struct ParseableType {
    schema: Arc<Schema>,
    type_ref: TypeRef,
}

impl ParseableType {
    /// Returns true if the type exists in the schema.
    pub fn is_valid(&self) -> bool {
        self.schema.resolve(&self.type_ref).is_some()
    }

    pub fn from_yaml(&self, yaml: &str) -> Result<TypedValue, ParseError> {
        let value: Value = serde_yaml::from_str(yaml).map_err(|e| ParseError::Yaml(e.to_string()))?;
        self.from_value(value)
    }

    pub fn from_value(&self, value: Value) -> Result<TypedValue, ParseError> {
        Ok(as_typed(value, Arc::clone(&self.schema), self.type_ref.clone())?)
    }
}

/// Error type for parsing operations.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("failed to parse schema: {0}")]
    Schema(String),
    #[error("failed to parse YAML: {0}")]
    Yaml(String),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

/// Returns the parseable type used for objects without a registered schema.
pub fn deduced_parseable_type() -> ParseableType {
    ParseableType {
        schema: Arc::new(deduced_schema()),
        type_ref: TypeRef::named(UNTYPED_DEDUCED),
    }
}
