//! Core schema elements and type definitions.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Schema is a list of named types.
///
/// Types are indexed by name on first lookup, so the schema should be
/// treated as immutable once built.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<TypeDef>,

    #[serde(skip)]
    type_map: OnceCell<HashMap<String, usize>>,
}

impl Clone for Schema {
    fn clone(&self) -> Self {
        Schema::with_types(self.types.clone())
    }
}

/// TypeDef represents a named type in a schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeDef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(flatten)]
    pub atom: Atom,
}

/// TypeRef either refers to a named type or declares an inlined type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeRef {
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "namedType")]
    pub named_type: Option<String>,

    #[serde(flatten)]
    pub inlined: Box<Atom>,

    /// Overrides the element relationship of the referred map or list type.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "elementRelationship"
    )]
    pub element_relationship: Option<ElementRelationship>,
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef {
            named_type: Some(name.into()),
            ..Default::default()
        }
    }

    fn is_unset(&self) -> bool {
        self.named_type.is_none() && self.inlined.is_empty()
    }
}

/// Atom is one of the possible shapes of a value. A type may allow several.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scalar: Option<Scalar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<List>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<Map>,
}

impl Atom {
    pub fn is_empty(&self) -> bool {
        self.scalar.is_none() && self.list.is_none() && self.map.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scalar {
    Numeric,
    String,
    Boolean,
    Untyped,
}

/// ElementRelationship describes how the items of a container relate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementRelationship {
    /// List items are identified by their key fields (or by value for sets).
    Associative,
    /// The container is compared and owned as a single leaf.
    Atomic,
    /// Items are independent of each other.
    #[default]
    Separable,
}

/// Map describes a struct (known fields) or a free-form map (element type).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Map {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<StructField>,

    #[serde(default, rename = "elementType")]
    pub element_type: TypeRef,

    #[serde(default, rename = "elementRelationship")]
    pub element_relationship: ElementRelationship,

    #[serde(skip)]
    field_map: OnceCell<HashMap<String, usize>>,
}

impl PartialEq for Map {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
            && self.element_type == other.element_type
            && self.element_relationship == other.element_relationship
    }
}

/// StructField pairs a field name with a field type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,

    #[serde(default, rename = "type")]
    pub field_type: TypeRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct List {
    #[serde(default, rename = "elementType")]
    pub element_type: TypeRef,

    #[serde(default, rename = "elementRelationship")]
    pub element_relationship: ElementRelationship,

    /// Key fields of an associative list of maps. Empty for sets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn with_types(types: Vec<TypeDef>) -> Self {
        Schema {
            types,
            type_map: OnceCell::new(),
        }
    }

    pub fn find_named_type(&self, name: &str) -> Option<&TypeDef> {
        let index = self.type_map.get_or_init(|| {
            self.types
                .iter()
                .enumerate()
                .map(|(i, t)| (t.name.clone(), i))
                .collect()
        });
        index.get(name).and_then(|i| self.types.get(*i))
    }

    /// Resolves a reference to its atom, applying any element relationship
    /// override. Returns None if a named type does not exist.
    pub fn resolve(&self, tr: &TypeRef) -> Option<Atom> {
        let mut atom = match &tr.named_type {
            Some(name) => self.find_named_type(name)?.atom.clone(),
            None => (*tr.inlined).clone(),
        };
        if let Some(er) = tr.element_relationship {
            if let Some(map) = atom.map.as_mut() {
                map.element_relationship = er;
            }
            if let Some(list) = atom.list.as_mut() {
                list.element_relationship = er;
            }
        }
        Some(atom)
    }
}

impl Map {
    pub fn with_fields(fields: Vec<StructField>) -> Self {
        Map {
            fields,
            ..Default::default()
        }
    }

    /// A free-form map whose values all have `element_type`.
    pub fn with_element_type(element_type: TypeRef, element_relationship: ElementRelationship) -> Self {
        Map {
            element_type,
            element_relationship,
            ..Default::default()
        }
    }

    pub fn find_field(&self, name: &str) -> Option<&StructField> {
        let index = self.field_map.get_or_init(|| {
            self.fields
                .iter()
                .enumerate()
                .map(|(i, f)| (f.name.clone(), i))
                .collect()
        });
        index.get(name).and_then(|i| self.fields.get(*i))
    }

    /// Returns the type of the named field, falling back to the element type.
    /// None means the field is not allowed.
    pub fn field_type(&self, name: &str) -> Option<&TypeRef> {
        match self.find_field(name) {
            Some(field) => Some(&field.field_type),
            None if self.element_type.is_unset() => None,
            None => Some(&self.element_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"types:
- name: container
  map:
    fields:
    - name: name
      type:
        scalar: string
    - name: ports
      type:
        list:
          elementType:
            namedType: port
          elementRelationship: associative
          keys: [containerPort, protocol]
- name: port
  map:
    elementType:
      scalar: untyped
"#;

    #[test]
    fn test_schema_yaml_parse() {
        let schema: Schema = serde_yaml::from_str(SCHEMA).unwrap();
        let container = schema.find_named_type("container").unwrap();
        let map = container.atom.map.as_ref().unwrap();
        let ports = map.field_type("ports").unwrap();
        let list = ports.inlined.list.as_ref().unwrap();
        assert_eq!(list.element_relationship, ElementRelationship::Associative);
        assert_eq!(list.keys, vec!["containerPort", "protocol"]);
        assert!(map.field_type("unknown").is_none());

        let port = schema.find_named_type("port").unwrap();
        assert!(port.atom.map.as_ref().unwrap().field_type("anything").is_some());
    }

    #[test]
    fn test_resolve_applies_relationship_override() {
        let schema: Schema = serde_yaml::from_str(SCHEMA).unwrap();
        let tr = TypeRef {
            element_relationship: Some(ElementRelationship::Atomic),
            ..TypeRef::named("container")
        };
        let atom = schema.resolve(&tr).unwrap();
        assert_eq!(
            atom.map.unwrap().element_relationship,
            ElementRelationship::Atomic
        );
        assert!(schema.resolve(&TypeRef::named("missing")).is_none());
    }
}
