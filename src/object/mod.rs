//! Object module - Kubernetes objects as untyped value trees.
//!
//! [`Unstructured`] wraps a [`Value`] map and exposes the metadata accessors
//! the normalizers and the diff engine need.

mod managed_fields;

pub use managed_fields::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::value::{Map, Value};

/// Annotation kubectl stores the last applied configuration under.
pub const LAST_APPLIED_CONFIG_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// GroupKind identifies a resource type independent of its version.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        GroupKind {
            group: group.into(),
            kind: kind.into(),
        }
    }

    /// Returns the override key form of this GroupKind: `group/kind`, or the
    /// bare kind for the core group.
    pub fn override_key(&self) -> String {
        if self.group.is_empty() {
            self.kind.clone()
        } else {
            format!("{}/{}", self.group, self.kind)
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// ResourceKey identifies one object in a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(
        group: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        ResourceKey {
            group: group.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.group, self.kind, self.namespace, self.name)
    }
}

/// Unstructured is a Kubernetes object held as a generic map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Unstructured {
    object: Map,
}

impl Unstructured {
    pub fn new(object: Map) -> Self {
        Unstructured { object }
    }

    /// Wraps a value, which must be a map.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Map(object) => Ok(Unstructured { object }),
            other => Err(Error::NotAnObject(other.type_name())),
        }
    }

    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        Self::from_value(Value::from(json))
    }

    pub fn from_json_slice(data: &[u8]) -> Result<Self> {
        let json: serde_json::Value = serde_json::from_slice(data)?;
        Self::from_json(json)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let json: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_json(json)
    }

    pub fn object(&self) -> &Map {
        &self.object
    }

    pub fn object_mut(&mut self) -> &mut Map {
        &mut self.object
    }

    pub fn into_value(self) -> Value {
        Value::Map(self.object)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.object
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.to_json())?)
    }

    /// Returns the value at a nested map path.
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        self.object.get(first)?.get_path(rest)
    }

    /// Sets the value at a nested map path, creating intermediate maps.
    pub fn set(&mut self, path: &[&str], value: Value) -> bool {
        let Some((first, rest)) = path.split_first() else {
            return false;
        };
        let entry = self
            .object
            .fields
            .entry(first.to_string())
            .or_insert(Value::Null);
        entry.set_path(rest, value)
    }

    /// Removes the value at a nested map path.
    pub fn remove(&mut self, path: &[&str]) -> Option<Value> {
        match path {
            [] => None,
            [key] => self.object.delete(key),
            [first, rest @ ..] => self.object.get_mut(first)?.remove_path(rest),
        }
    }

    fn string_field(&self, path: &[&str]) -> &str {
        self.get(path).and_then(Value::as_str).unwrap_or_default()
    }

    pub fn api_version(&self) -> &str {
        self.string_field(&["apiVersion"])
    }

    pub fn kind(&self) -> &str {
        self.string_field(&["kind"])
    }

    pub fn name(&self) -> &str {
        self.string_field(&["metadata", "name"])
    }

    pub fn namespace(&self) -> &str {
        self.string_field(&["metadata", "namespace"])
    }

    pub fn resource_version(&self) -> &str {
        self.string_field(&["metadata", "resourceVersion"])
    }

    /// Returns the API group, parsed from `apiVersion`.
    pub fn group(&self) -> &str {
        match self.api_version().split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(self.group(), self.kind())
    }

    pub fn resource_key(&self) -> ResourceKey {
        ResourceKey::new(self.group(), self.kind(), self.namespace(), self.name())
    }

    fn string_map(&self, path: &[&str]) -> BTreeMap<String, String> {
        self.get(path)
            .and_then(Value::as_map)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.string_map(&["metadata", "annotations"])
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.get(&["metadata", "annotations", key])
            .and_then(Value::as_str)
    }

    pub fn set_annotation(&mut self, key: &str, value: impl Into<String>) {
        self.set(&["metadata", "annotations", key], Value::String(value.into()));
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.string_map(&["metadata", "labels"])
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.get(&["metadata", "labels", key]).and_then(Value::as_str)
    }

    pub fn set_label(&mut self, key: &str, value: impl Into<String>) {
        self.set(&["metadata", "labels", key], Value::String(value.into()));
    }
}

impl fmt::Display for Unstructured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group_kind(), self.namespace(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn deployment() -> Unstructured {
        Unstructured::from_json(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": "guestbook",
                "namespace": "default",
                "resourceVersion": "123",
                "labels": {"app": "guestbook"}
            },
            "spec": {"replicas": 1}
        }))
        .unwrap()
    }

    #[test]
    fn test_metadata_accessors() {
        let obj = deployment();
        assert_eq!(obj.group_kind(), GroupKind::new("apps", "Deployment"));
        assert_eq!(obj.name(), "guestbook");
        assert_eq!(obj.namespace(), "default");
        assert_eq!(obj.resource_version(), "123");
        assert_eq!(obj.label("app"), Some("guestbook"));
        assert_eq!(
            obj.resource_key(),
            ResourceKey::new("apps", "Deployment", "default", "guestbook")
        );
    }

    #[test]
    fn test_core_group_is_empty() {
        let obj = Unstructured::from_json(json!({"apiVersion": "v1", "kind": "ConfigMap"})).unwrap();
        assert_eq!(obj.group(), "");
        assert_eq!(obj.group_kind().override_key(), "ConfigMap");
    }

    #[test]
    fn test_set_and_remove() {
        let mut obj = deployment();
        obj.set_annotation("a", "b");
        assert_eq!(obj.annotation("a"), Some("b"));
        assert_eq!(obj.remove(&["spec", "replicas"]), Some(Value::Int(1)));
        assert!(obj.get(&["spec", "replicas"]).is_none());
    }

    #[test]
    fn test_non_map_is_rejected() {
        assert!(Unstructured::from_json(json!([1, 2])).is_err());
    }
}
