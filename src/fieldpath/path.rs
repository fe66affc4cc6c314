//! Path element and path types.

use std::fmt;

use crate::value::{FieldList, Value};

/// One step into a nested object.
///
/// Variants order before their payloads, so field names sort ahead of list
/// keys, set values and indexes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathElement {
    /// A map or struct field.
    FieldName(String),
    /// An associative list item, by the values of its key fields.
    Key(FieldList),
    /// A set item, by its own value.
    Value(Value),
    /// A list item by position, for lists that can't be keyed.
    Index(i32),
}

impl PathElement {
    pub fn field_name(name: impl Into<String>) -> Self {
        PathElement::FieldName(name.into())
    }

    pub fn key(fields: FieldList) -> Self {
        PathElement::Key(fields)
    }

    pub fn value(v: Value) -> Self {
        PathElement::Value(v)
    }

    pub fn index(i: i32) -> Self {
        PathElement::Index(i)
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::FieldName(name) => write!(f, ".{}", name),
            PathElement::Key(key) => {
                let fields: Vec<String> = key
                    .fields
                    .iter()
                    .map(|field| format!("{}={}", field.name, field.value.to_json()))
                    .collect();
                write!(f, "[{}]", fields.join(","))
            }
            PathElement::Value(v) => write!(f, "[={}]", v.to_json()),
            PathElement::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// A sequence of path elements from the object root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<PathElement>);

impl Path {
    pub fn new() -> Self {
        Path::default()
    }

    pub fn from_elements(elements: Vec<PathElement>) -> Self {
        Path(elements)
    }

    /// A path made only of field names, e.g. `["spec", "replicas"]`.
    pub fn from_field_names(names: &[&str]) -> Self {
        Path(names.iter().map(|n| PathElement::field_name(*n)).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, element: PathElement) {
        self.0.push(element);
    }

    pub fn pop(&mut self) -> Option<PathElement> {
        self.0.pop()
    }

    /// A copy of this path extended by `element`.
    pub fn with(&self, element: PathElement) -> Self {
        let mut path = self.clone();
        path.push(element);
        path
    }

    pub fn as_slice(&self) -> &[PathElement] {
        &self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|element| write!(f, "{}", element))
    }
}
