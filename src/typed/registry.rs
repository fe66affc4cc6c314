//! Per-kind schema lookup for typed comparisons.

use std::collections::HashMap;

use super::parser::{deduced_parseable_type, ParseError, ParseableType, Parser};
use crate::object::GroupKind;

/// SchemaRegistry maps resource kinds to the schema type their objects are
/// compared with. Kinds without an entry use the deduced type.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    types: HashMap<GroupKind, ParseableType>,
    deduced: ParseableType,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        SchemaRegistry {
            types: HashMap::new(),
            deduced: deduced_parseable_type(),
        }
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        SchemaRegistry::default()
    }

    pub fn register(&mut self, gk: GroupKind, pt: ParseableType) {
        self.types.insert(gk, pt);
    }

    /// Parses a schema and registers each `(group_kind, type_name)` pair
    /// against it.
    pub fn register_schema(
        &mut self,
        schema_yaml: &str,
        kinds: &[(GroupKind, &str)],
    ) -> Result<(), ParseError> {
        let parser = Parser::new(schema_yaml)?;
        for (gk, type_name) in kinds {
            let pt = parser.type_by_name(type_name);
            if !pt.is_valid() {
                return Err(ParseError::Schema(format!(
                    "no type found matching: {}",
                    type_name
                )));
            }
            self.types.insert(gk.clone(), pt);
        }
        Ok(())
    }

    /// Returns the type for a kind, or the deduced type.
    pub fn parseable_type(&self, gk: &GroupKind) -> &ParseableType {
        self.types.get(gk).unwrap_or(&self.deduced)
    }

    pub fn contains(&self, gk: &GroupKind) -> bool {
        self.types.contains_key(gk)
    }
}
