//! Remarshaling of configured fields through known types, so that values
//! such as `"0.5"` and `"500m"` compare equal.

use std::collections::HashMap;
use tracing::warn;

use super::normalize_as::alias_group_kind;
use super::registry::{KnownType, KnownTypeRegistry};
use super::Normalizer;
use crate::error::{Error, Result};
use crate::object::{GroupKind, Unstructured};
use crate::settings::{parse_override_key, ResourceOverride};
use crate::value::{Map, Value};

const ROLLOUT_GROUP: &str = "argoproj.io";
const ROLLOUT_KIND: &str = "Rollout";
const POD_SPEC_TYPE: &str = "core/v1/PodSpec";

#[derive(Debug, Clone)]
struct KnownTypeField {
    field_path: Vec<String>,
    known_type: KnownType,
}

impl KnownTypeField {
    fn path(&self) -> String {
        self.field_path.join(".")
    }

    fn remarshal(&self, value: &Value) -> Result<Value> {
        self.known_type.remarshal(value).map_err(|message| Error::KnownType {
            path: self.path(),
            type_name: self.known_type.name().to_string(),
            message,
        })
    }
}

/// Canonicalizes fields per GroupKind.
#[derive(Debug, Clone, Default)]
pub struct KnownTypesNormalizer {
    type_fields: HashMap<GroupKind, Vec<KnownTypeField>>,
    aliases: HashMap<GroupKind, GroupKind>,
}

impl KnownTypesNormalizer {
    /// Builds the field mappings from the overrides' `knownTypeFields`.
    /// Mappings naming an unregistered type are skipped with a warning.
    pub fn new(overrides: &HashMap<String, ResourceOverride>, registry: &KnownTypeRegistry) -> Result<Self> {
        let mut normalizer = KnownTypesNormalizer::default();

        let mut keys: Vec<&String> = overrides.keys().collect();
        keys.sort();
        for key in keys {
            let resource_override = &overrides[key];
            let (group, kind) = match parse_override_key(key) {
                Ok(gk) => gk,
                Err(e) => {
                    warn!(error = %e, "skipping known type fields of resource override");
                    continue;
                }
            };
            let gk = GroupKind::new(group, kind);

            if let Some(alias) = resource_override.normalize_as.as_deref().filter(|a| !a.is_empty()) {
                match parse_override_key(alias) {
                    Ok((group, kind)) => {
                        normalizer.aliases.insert(gk.clone(), GroupKind::new(group, kind));
                    }
                    Err(e) => warn!(error = %e, key = key.as_str(), "ignoring normalizeAs"),
                }
            }

            for field in &resource_override.known_type_fields {
                if let Err(e) = normalizer.add_known_field(registry, &gk, &field.field, &field.type_name) {
                    warn!(error = %e, "failed to configure known field normalizer");
                }
            }
        }

        normalizer.ensure_default_crds_configured(registry);
        Ok(normalizer)
    }

    fn add_known_field(
        &mut self,
        registry: &KnownTypeRegistry,
        gk: &GroupKind,
        path: &str,
        type_name: &str,
    ) -> Result<()> {
        let known_type = registry
            .get(type_name)
            .ok_or_else(|| Error::Config(format!("type '{}' is not supported", type_name)))?;
        self.type_fields.entry(gk.clone()).or_default().push(KnownTypeField {
            field_path: path.split('.').map(str::to_string).collect(),
            known_type: known_type.clone(),
        });
        Ok(())
    }

    fn ensure_default_crds_configured(&mut self, registry: &KnownTypeRegistry) {
        let rollout = GroupKind::new(ROLLOUT_GROUP, ROLLOUT_KIND);
        if self.type_fields.contains_key(&rollout) {
            return;
        }
        if let Some(pod_spec) = registry.get(POD_SPEC_TYPE) {
            self.type_fields.insert(
                rollout,
                vec![KnownTypeField {
                    field_path: vec!["spec".into(), "template".into(), "spec".into()],
                    known_type: pod_spec.clone(),
                }],
            );
        }
    }

    /// Returns the dotted field paths configured for a GroupKind.
    pub fn field_paths(&self, gk: &GroupKind) -> Vec<String> {
        self.type_fields
            .get(gk)
            .map(|fields| fields.iter().map(KnownTypeField::path).collect())
            .unwrap_or_default()
    }

    fn fields_for(&self, un: &Unstructured) -> Vec<&KnownTypeField> {
        let gk = un.group_kind();
        let mut kinds = vec![gk.clone()];
        let alias = alias_group_kind(un).or_else(|| self.aliases.get(&gk).cloned());
        if let Some(alias) = alias.filter(|a| *a != gk) {
            kinds.push(alias);
        }
        kinds
            .iter()
            .filter_map(|gk| self.type_fields.get(gk))
            .flatten()
            .collect()
    }
}

fn nested_mut<'a>(obj: &'a mut Map, path: &[String]) -> Option<&'a mut Value> {
    let (first, rest) = path.split_first()?;
    let mut current = obj.get_mut(first)?;
    for key in rest {
        current = current.as_map_mut()?.get_mut(key)?;
    }
    Some(current)
}

// A list on the way down fans the rest of the path out over its map items.
fn normalize_field(obj: &mut Map, field: &KnownTypeField, path: &[String]) -> Result<()> {
    for i in 0..path.len() {
        let Some(Value::List(items)) = nested_mut(obj, &path[..=i]) else {
            continue;
        };
        let rest = &path[i + 1..];
        for item in items.iter_mut() {
            if rest.is_empty() {
                if item.is_map() {
                    *item = field.remarshal(item)?;
                }
            } else if let Value::Map(m) = item {
                normalize_field(m, field, rest)?;
            }
        }
        return Ok(());
    }

    match nested_mut(obj, path) {
        Some(value) if !value.is_null() => {
            *value = field.remarshal(value)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

impl Normalizer for KnownTypesNormalizer {
    fn normalize(&self, un: &mut Unstructured) -> Result<()> {
        for field in self.fields_for(un) {
            normalize_field(un.object_mut(), field, &field.field_path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizers::NORMALIZE_AS_ANNOTATION;
    use crate::settings::KnownTypeField as FieldSetting;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn override_with_fields(fields: &[(&str, &str)]) -> ResourceOverride {
        ResourceOverride {
            known_type_fields: fields
                .iter()
                .map(|(field, type_name)| FieldSetting {
                    field: field.to_string(),
                    type_name: type_name.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    fn normalizer(overrides: HashMap<String, ResourceOverride>) -> KnownTypesNormalizer {
        KnownTypesNormalizer::new(&overrides, &KnownTypeRegistry::new()).unwrap()
    }

    fn rollout() -> Unstructured {
        Unstructured::from_json(json!({
            "apiVersion": "argoproj.io/v1alpha1",
            "kind": "Rollout",
            "metadata": {"name": "canary"},
            "spec": {
                "template": {
                    "spec": {
                        "containers": [{
                            "name": "app",
                            "resources": {"requests": {"cpu": "0.5", "memory": "0.5Gi"}}
                        }]
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_default_rollout_mapping() {
        let n = normalizer(HashMap::new());
        assert_eq!(
            n.field_paths(&GroupKind::new("argoproj.io", "Rollout")),
            vec!["spec.template.spec"]
        );

        let mut un = rollout();
        n.normalize(&mut un).unwrap();
        assert_eq!(
            un.get(&["spec", "template", "spec", "containers"]).unwrap().to_json(),
            json!([{"name": "app", "resources": {"requests": {"cpu": "500m", "memory": "512Mi"}}}])
        );
    }

    #[test]
    fn test_override_replaces_default_rollout_mapping() {
        let n = normalizer(HashMap::from([(
            "argoproj.io/Rollout".to_string(),
            override_with_fields(&[("spec.restartAt", "meta/v1/Duration")]),
        )]));
        assert_eq!(
            n.field_paths(&GroupKind::new("argoproj.io", "Rollout")),
            vec!["spec.restartAt"]
        );
    }

    #[test]
    fn test_unknown_type_and_bad_key_are_skipped() {
        let n = normalizer(HashMap::from([
            ("apps/Deployment".to_string(), override_with_fields(&[("spec", "core/v1/Nope")])),
            ("a/b/c".to_string(), override_with_fields(&[("spec", "core/Quantity")])),
        ]));
        assert!(n.field_paths(&GroupKind::new("apps", "Deployment")).is_empty());
    }

    #[test]
    fn test_list_fields_fan_out() {
        let n = normalizer(HashMap::from([(
            "example.com/Budget".to_string(),
            override_with_fields(&[("spec.limits.amount", "core/Quantity"), ("spec.timeouts.after", "meta/v1/Duration")]),
        )]));
        let mut un = Unstructured::from_json(json!({
            "apiVersion": "example.com/v1",
            "kind": "Budget",
            "spec": {
                "limits": [{"amount": "1.25G"}, {"amount": "2000"}, {"other": 1}],
                "timeouts": {"after": "90s"}
            }
        }))
        .unwrap();

        n.normalize(&mut un).unwrap();
        assert_eq!(
            un.get(&["spec"]).unwrap().to_json(),
            json!({
                "limits": [{"amount": "1250M"}, {"amount": "2k"}, {"other": 1}],
                "timeouts": {"after": "1m30s"}
            })
        );
    }

    #[test]
    fn test_missing_field_is_noop() {
        let n = normalizer(HashMap::from([(
            "apps/Deployment".to_string(),
            override_with_fields(&[("spec.template.spec", "core/v1/PodSpec")]),
        )]));
        let mut un = Unstructured::from_json(json!({"apiVersion": "apps/v1", "kind": "Deployment", "spec": {}})).unwrap();
        let before = un.clone();
        n.normalize(&mut un).unwrap();
        assert_eq!(un, before);
    }

    #[test]
    fn test_undecodable_value_names_field() {
        let n = normalizer(HashMap::from([(
            "apps/Deployment".to_string(),
            override_with_fields(&[("spec.template.spec", "core/v1/PodSpec")]),
        )]));
        let mut un = Unstructured::from_json(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "spec": {"template": {"spec": {"containers": "not-a-list"}}}
        }))
        .unwrap();
        let err = n.normalize(&mut un).unwrap_err();
        assert!(matches!(&err, Error::KnownType { path, .. } if path == "spec.template.spec"));
    }

    #[test]
    fn test_known_types_normalizer_is_idempotent() {
        let n = normalizer(HashMap::new());
        let mut once = rollout();
        n.normalize(&mut once).unwrap();
        let mut twice = once.clone();
        n.normalize(&mut twice).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_alias_group_kind_fields_apply() {
        let n = normalizer(HashMap::new());
        let mut un = rollout();
        un.set(&["kind"], Value::from("CanaryRollout"));
        un.set_annotation(NORMALIZE_AS_ANNOTATION, "argoproj.io/Rollout");
        n.normalize(&mut un).unwrap();
        assert_eq!(
            un.get(&["spec", "template", "spec", "containers"]).unwrap().to_json(),
            json!([{"name": "app", "resources": {"requests": {"cpu": "500m", "memory": "512Mi"}}}])
        );

        let n = normalizer(HashMap::from([(
            "example.com/Canary".to_string(),
            ResourceOverride {
                normalize_as: Some("argoproj.io/Rollout".into()),
                ..Default::default()
            },
        )]));
        let mut un = rollout();
        un.set(&["apiVersion"], Value::from("example.com/v1"));
        un.set(&["kind"], Value::from("Canary"));
        n.normalize(&mut un).unwrap();
        assert_eq!(
            un.get(&["spec", "template", "spec", "containers"]).unwrap().to_json()[0]["resources"]["requests"]["cpu"],
            json!("500m")
        );
    }
}
