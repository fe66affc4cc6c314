//! FieldsV1 (de)serialization for field sets.
//!
//! Keys are prefixed by element type: `f:` field name, `k:` associative list
//! key, `v:` set value, `i:` list index. A `"."` entry marks the enclosing
//! element itself as a member.

use super::path::PathElement;
use super::set::Set;
use crate::value::{Field, FieldList, Value};
use serde_json::{Map as JsonMap, Value as Json};
use thiserror::Error;

/// Error raised while decoding a FieldsV1 document.
#[derive(Debug, Clone, Error)]
pub enum SerializeError {
    #[error("key must be at least 2 characters long: '{0}'")]
    KeyTooShort(String),
    #[error("unknown path element type: {0}")]
    UnknownPrefix(String),
    #[error("invalid index '{0}'")]
    InvalidIndex(String),
    #[error("invalid json in path element '{key}': {message}")]
    InvalidJson { key: String, message: String },
    #[error("expected JSON object for key '{0}'")]
    ExpectedObject(String),
}

/// Serializes a PathElement to its FieldsV1 key.
pub fn serialize_path_element(pe: &PathElement) -> String {
    match pe {
        PathElement::FieldName(name) => format!("f:{}", name),
        PathElement::Value(v) => format!("v:{}", v.to_json()),
        PathElement::Key(fields) => {
            let obj: JsonMap<String, Json> = fields
                .iter()
                .map(|f| (f.name.clone(), f.value.to_json()))
                .collect();
            format!("k:{}", Json::Object(obj))
        }
        PathElement::Index(i) => format!("i:{}", i),
    }
}

/// Deserializes a PathElement from its FieldsV1 key.
pub fn deserialize_path_element(s: &str) -> Result<PathElement, SerializeError> {
    let (Some(prefix), Some(content)) = (s.get(..2), s.get(2..)) else {
        return Err(SerializeError::KeyTooShort(s.to_string()));
    };

    let parse_json = |content: &str| -> Result<Json, SerializeError> {
        serde_json::from_str(content).map_err(|e| SerializeError::InvalidJson {
            key: s.to_string(),
            message: e.to_string(),
        })
    };

    match prefix {
        "f:" => Ok(PathElement::FieldName(content.to_string())),
        "v:" => Ok(PathElement::Value(Value::from(parse_json(content)?))),
        "k:" => match parse_json(content)? {
            Json::Object(obj) => Ok(PathElement::Key(FieldList::with_fields(
                obj.into_iter()
                    .map(|(name, v)| Field {
                        name,
                        value: Value::from(v),
                    })
                    .collect(),
            ))),
            _ => Err(SerializeError::ExpectedObject(s.to_string())),
        },
        "i:" => content
            .parse::<i32>()
            .map(PathElement::Index)
            .map_err(|_| SerializeError::InvalidIndex(s.to_string())),
        _ => Err(SerializeError::UnknownPrefix(prefix.to_string())),
    }
}

impl Set {
    /// Decodes a FieldsV1 JSON document.
    ///
    /// Unknown key prefixes are skipped so newer encodings still parse.
    pub fn from_fields_v1(doc: &Json) -> Result<Set, SerializeError> {
        match doc {
            Json::Object(obj) => Self::from_json_object(obj),
            _ => Err(SerializeError::ExpectedObject(doc.to_string())),
        }
    }

    /// Decodes FieldsV1 JSON bytes.
    pub fn from_json(data: &[u8]) -> Result<Set, SerializeError> {
        let doc: Json = serde_json::from_slice(data).map_err(|e| SerializeError::InvalidJson {
            key: String::new(),
            message: e.to_string(),
        })?;
        Self::from_fields_v1(&doc)
    }

    fn from_json_object(obj: &JsonMap<String, Json>) -> Result<Set, SerializeError> {
        let mut set = Set::new();
        for (key, value) in obj {
            if key == "." {
                continue;
            }
            let pe = match deserialize_path_element(key) {
                Ok(pe) => pe,
                Err(SerializeError::UnknownPrefix(_)) => continue,
                Err(e) => return Err(e),
            };
            let Json::Object(child_obj) = value else {
                return Err(SerializeError::ExpectedObject(key.clone()));
            };
            if child_obj.is_empty() || child_obj.contains_key(".") {
                set.members.insert(pe.clone());
            }
            let child = Self::from_json_object(child_obj)?;
            if !child.is_empty() {
                set.children.insert(pe, child);
            }
        }
        Ok(set)
    }

    /// Encodes this set as a FieldsV1 JSON document.
    pub fn to_fields_v1(&self) -> Json {
        Json::Object(self.to_json_object(false))
    }

    fn to_json_object(&self, include_self: bool) -> JsonMap<String, Json> {
        let mut result = JsonMap::new();
        if include_self {
            result.insert(".".to_string(), Json::Object(JsonMap::new()));
        }
        for member in &self.members {
            if !self.children.contains_key(member) {
                result.insert(serialize_path_element(member), Json::Object(JsonMap::new()));
            }
        }
        for (pe, child) in &self.children {
            let include = self.members.contains(pe);
            result.insert(
                serialize_path_element(pe),
                Json::Object(child.to_json_object(include)),
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fieldpath::Path;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_path_element_keys() {
        let key = PathElement::key(FieldList::with_fields(vec![
            Field {
                name: "protocol".into(),
                value: Value::from("TCP"),
            },
            Field {
                name: "port".into(),
                value: Value::Int(443),
            },
        ]));
        assert_eq!(serialize_path_element(&key), r#"k:{"port":443,"protocol":"TCP"}"#);
        assert_eq!(
            deserialize_path_element(r#"k:{"protocol":"TCP","port":443}"#).unwrap(),
            key
        );
        assert_eq!(
            deserialize_path_element("i:3").unwrap(),
            PathElement::index(3)
        );
        assert!(deserialize_path_element("f").is_err());
        assert!(deserialize_path_element("i:x").is_err());
    }

    #[test]
    fn test_fields_v1_with_dot_member() {
        let doc = json!({
            "f:metadata": {
                "f:labels": {".": {}, "f:app": {}}
            },
            "f:spec": {"f:replicas": {}}
        });
        let set = Set::from_fields_v1(&doc).unwrap();
        assert!(set.has(&Path::from_field_names(&["metadata", "labels"])));
        assert!(set.has(&Path::from_field_names(&["metadata", "labels", "app"])));
        assert!(set.has(&Path::from_field_names(&["spec", "replicas"])));
        assert!(!set.has(&Path::from_field_names(&["spec"])));

        assert_eq!(set.to_fields_v1(), doc);
    }

    #[test]
    fn test_unknown_prefix_is_dropped() {
        let set = Set::from_fields_v1(&json!({"f:aaa": {}, "r:aab": {}})).unwrap();
        assert_eq!(set.to_fields_v1(), json!({"f:aaa": {}}));
    }

    #[test]
    fn test_malformed_fields_v1() {
        assert!(Set::from_fields_v1(&json!({"f:spec": 1})).is_err());
        assert!(Set::from_fields_v1(&json!([])).is_err());
    }
}
