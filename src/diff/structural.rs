//! Structural diff of live against desired state.
//!
//! Both sides are brought to a canonical form first: numbers remarshaled,
//! built-in per-kind normalizations applied, then the configured
//! normalizer. The prediction of what live becomes once the desired state is
//! applied is a JSON merge patch replayed onto live, or a structured merge
//! when server-side apply is in use; the object is modified when that
//! prediction differs from live.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use k8s_openapi::api::core::v1 as corev1;
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::normalizers::Normalizer;
use crate::object::{Unstructured, LAST_APPLIED_CONFIG_ANNOTATION};
use crate::typed::SchemaRegistry;
use crate::value::patch::{apply_merge_patch, create_three_way_merge_patch, remove_map_fields};
use crate::value::{Map, Value};

use super::structured_merge::{has_server_side_apply_option, structured_merge_diff};

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

/// The outcome of diffing one resource.
///
/// `normalized_live` and `predicted_live` hold JSON documents, `null` for an
/// absent side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub normalized_live: Vec<u8>,
    pub predicted_live: Vec<u8>,
    pub modified: bool,
}

/// Positionally aligned results of diffing many resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResultList {
    pub diffs: Vec<DiffResult>,
    pub modified: bool,
}

/// Options of a structural diff.
#[derive(Clone, Copy, Default)]
pub struct DiffOptions<'a> {
    normalizer: Option<&'a dyn Normalizer>,
    ignore_aggregated_roles: bool,
    structured_merge_diff: bool,
    manager: &'a str,
    schema_registry: Option<&'a SchemaRegistry>,
}

impl<'a> DiffOptions<'a> {
    pub fn new() -> Self {
        DiffOptions::default()
    }

    /// Runs `normalizer` over both sides after the built-in normalizations.
    pub fn with_normalizer(mut self, normalizer: &'a dyn Normalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Ignores the rules of roles that aggregate other roles.
    pub fn with_ignore_aggregated_roles(mut self, ignore: bool) -> Self {
        self.ignore_aggregated_roles = ignore;
        self
    }

    /// Predicts live through a structured merge for every object, not only
    /// those whose sync options ask for server-side apply.
    pub fn with_structured_merge_diff(mut self, enabled: bool) -> Self {
        self.structured_merge_diff = enabled;
        self
    }

    /// The field manager the structured merge applies as.
    pub fn with_manager(mut self, manager: &'a str) -> Self {
        self.manager = manager;
        self
    }

    /// Schemas for the structured merge. Kinds without one are deduced.
    pub fn with_schema_registry(mut self, registry: &'a SchemaRegistry) -> Self {
        self.schema_registry = Some(registry);
        self
    }
}

/// Diffs one desired object against its live counterpart.
///
/// A missing `live` is a create and a missing `config` a delete. Errors
/// only when both are missing.
pub fn diff(config: Option<&Unstructured>, live: Option<&Unstructured>, opts: &DiffOptions<'_>) -> Result<DiffResult> {
    let config = config.map(|c| prepare(c, opts)).transpose()?;
    let live = live.map(|l| prepare(l, opts)).transpose()?;

    if opts.structured_merge_diff || config.as_ref().is_some_and(has_server_side_apply_option) {
        let deduced;
        let registry = match opts.schema_registry {
            Some(registry) => registry,
            None => {
                deduced = SchemaRegistry::new();
                &deduced
            }
        };
        return structured_merge_diff(config.as_ref(), live.as_ref(), registry, opts.manager)
            .map_err(|e| Error::diff("error calculating structured merge diff", e));
    }

    match (config.as_ref(), live.as_ref()) {
        (Some(config), Some(live)) => {
            match last_applied(live) {
                Ok(Some(orig)) => {
                    let orig = prepare(&orig, opts)?;
                    match three_way_diff(&orig, config, live) {
                        Ok(result) => return Ok(result),
                        Err(e) => debug!(error = %e, resource = %live, "three-way diff failed, falling back to two-way"),
                    }
                }
                Ok(None) => {}
                Err(e) => debug!(error = %e, resource = %live, "could not parse last applied configuration"),
            }
            two_way_diff(config, live)
        }
        (config, live) => handle_create_delete(config, live),
    }
}

/// Diffs positionally aligned desired and live objects.
pub fn diff_array(
    configs: &[Option<Unstructured>],
    lives: &[Option<Unstructured>],
    opts: &DiffOptions<'_>,
) -> Result<DiffResultList> {
    if configs.len() != lives.len() {
        return Err(Error::MismatchedLengths);
    }
    let mut list = DiffResultList::default();
    for (config, live) in configs.iter().zip(lives) {
        let result = diff(config.as_ref(), live.as_ref(), opts)?;
        list.modified |= result.modified;
        list.diffs.push(result);
    }
    Ok(list)
}

fn prepare(un: &Unstructured, opts: &DiffOptions<'_>) -> Result<Unstructured> {
    let mut un = remarshal(un)?;
    normalize_object(&mut un, opts);
    Ok(un)
}

// Integral floats become integers so both sides encode numbers alike.
fn remarshal(un: &Unstructured) -> Result<Unstructured> {
    let mut value = un.clone().into_value();
    value.canonicalize_numbers();
    Unstructured::from_value(value)
}

/// Applies the built-in normalizations, then the configured normalizer.
///
/// A failing normalizer is logged and leaves the object as far as it got.
pub fn normalize_object(un: &mut Unstructured, opts: &DiffOptions<'_>) {
    un.remove(&["metadata", "creationTimestamp"]);

    let gk = un.group_kind();
    match (gk.group.as_str(), gk.kind.as_str()) {
        ("", "Secret") => normalize_secret(un),
        ("", "Endpoints") => normalize_endpoints(un),
        (RBAC_GROUP, "Role" | "ClusterRole") => normalize_role(un, opts.ignore_aggregated_roles),
        _ => {}
    }

    if let Some(normalizer) = opts.normalizer {
        if let Err(e) = normalizer.normalize(un) {
            warn!(
                group = gk.group.as_str(),
                kind = gk.kind.as_str(),
                namespace = un.namespace(),
                name = un.name(),
                error = %e,
                "failed to normalize resource"
            );
        }
    }
}

// Folds stringData into data the way the API server stores it.
fn normalize_secret(un: &mut Unstructured) {
    if matches!(un.get(&["stringData"]), Some(Value::Map(_))) {
        if let Some(Value::Map(string_data)) = un.remove(&["stringData"]) {
            let mut data = match un.remove(&["data"]) {
                Some(Value::Map(data)) => data,
                _ => Map::new(),
            };
            for (key, value) in string_data.fields {
                let encoded = match value {
                    Value::String(s) => Value::String(STANDARD.encode(s)),
                    other => other,
                };
                data.set(key, encoded);
            }
            un.set(&["data"], Value::Map(data));
        }
    }

    if let Some(Value::Map(data)) = un.object_mut().get_mut("data") {
        for value in data.fields.values_mut() {
            if value.is_null() {
                *value = Value::String(String::new());
            }
        }
    }
}

fn normalize_role(un: &mut Unstructured, ignore_aggregated_roles: bool) {
    if ignore_aggregated_roles {
        let aggregated = match un.get(&["aggregationRule"]) {
            Some(Value::Map(_)) => true,
            Some(_) => {
                debug!(resource = %un, "aggregationRule is not a map, ignoring");
                false
            }
            None => false,
        };
        if aggregated {
            un.set(&["rules"], Value::Null);
        }
    }
    if matches!(un.get(&["rules"]), Some(Value::List(rules)) if rules.is_empty()) {
        un.set(&["rules"], Value::Null);
    }
}

// Defaults port protocols and sorts subsets so equivalent endpoints encode
// identically.
fn normalize_endpoints(un: &mut Unstructured) {
    let mut endpoints: corev1::Endpoints = match serde_json::from_value(un.to_json()) {
        Ok(endpoints) => endpoints,
        Err(e) => {
            debug!(error = %e, resource = %un, "failed to convert from unstructured into Endpoints");
            return;
        }
    };

    if let Some(subsets) = endpoints.subsets.as_mut() {
        for subset in subsets.iter_mut() {
            for port in subset.ports.iter_mut().flatten() {
                if port.protocol.as_deref().unwrap_or_default().is_empty() {
                    port.protocol = Some("TCP".to_string());
                }
            }
            for addresses in [subset.addresses.as_mut(), subset.not_ready_addresses.as_mut()]
                .into_iter()
                .flatten()
            {
                addresses.sort_by(|a, b| a.ip.cmp(&b.ip));
            }
            if let Some(ports) = subset.ports.as_mut() {
                ports.sort_by(|a, b| (&a.name, a.port, &a.protocol).cmp(&(&b.name, b.port, &b.protocol)));
            }
        }
        subsets.sort_by_cached_key(|subset| serde_json::to_string(subset).unwrap_or_default());
    }

    match serde_json::to_value(&endpoints) {
        Ok(json) => match Unstructured::from_json(json) {
            Ok(normalized) => *un = normalized,
            Err(e) => debug!(error = %e, "could not marshal endpoints"),
        },
        Err(e) => debug!(error = %e, "could not marshal endpoints"),
    }
}

fn last_applied(live: &Unstructured) -> Result<Option<Unstructured>> {
    match live.annotation(LAST_APPLIED_CONFIG_ANNOTATION) {
        Some(data) if !data.is_empty() => Ok(Some(Unstructured::from_json_slice(data.as_bytes())?)),
        _ => Ok(None),
    }
}

fn two_way_diff(config: &Unstructured, live: &Unstructured) -> Result<DiffResult> {
    three_way_diff(config, config, live)
}

fn three_way_diff(orig: &Unstructured, config: &Unstructured, live: &Unstructured) -> Result<DiffResult> {
    let orig = remove_namespace_annotation(orig).to_json();
    let config = remove_namespace_annotation(config).to_json();
    let live = live.to_json();

    let (Json::Object(orig_map), Json::Object(live_map)) = (&orig, &live) else {
        return Err(Error::InvalidState("objects must be maps".into()));
    };
    let pruned_live = Json::Object(remove_map_fields(orig_map, live_map));
    let patch = create_three_way_merge_patch(&orig, &config, &pruned_live);

    let live_bytes = serde_json::to_vec(&live)?;
    let mut predicted = live;
    apply_merge_patch(&mut predicted, &patch);
    let predicted_bytes = serde_json::to_vec(&predicted)?;

    Ok(DiffResult {
        modified: live_bytes != predicted_bytes,
        normalized_live: live_bytes,
        predicted_live: predicted_bytes,
    })
}

// The namespace is applied from the app destination and empty annotations
// are dropped by the API server.
fn remove_namespace_annotation(un: &Unstructured) -> Unstructured {
    let mut un = un.clone();
    un.remove(&["metadata", "namespace"]);
    if matches!(un.get(&["metadata", "annotations"]), Some(Value::Null))
        || matches!(un.get(&["metadata", "annotations"]), Some(Value::Map(m)) if m.is_empty())
    {
        un.remove(&["metadata", "annotations"]);
    }
    un
}

pub(super) fn handle_create_delete(config: Option<&Unstructured>, live: Option<&Unstructured>) -> Result<DiffResult> {
    const NULL: &[u8] = b"null";
    match (config, live) {
        (None, Some(live)) => Ok(DiffResult {
            normalized_live: live.to_json_bytes()?,
            predicted_live: NULL.to_vec(),
            modified: false,
        }),
        (Some(config), None) => Ok(DiffResult {
            normalized_live: NULL.to_vec(),
            predicted_live: config.to_json_bytes()?,
            modified: true,
        }),
        (None, None) => Err(Error::InvalidState("both live and config are null objects".into())),
        (Some(_), Some(_)) => Err(Error::InvalidState(
            "live and config are both present, expected a create or delete".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn obj(json: Json) -> Unstructured {
        Unstructured::from_json(json).unwrap()
    }

    fn predicted(result: &DiffResult) -> Json {
        serde_json::from_slice(&result.predicted_live).unwrap()
    }

    fn deployment(replicas: i64) -> Json {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "guestbook", "namespace": "default"},
            "spec": {"replicas": replicas}
        })
    }

    #[test]
    fn test_defaulted_live_fields_are_not_a_diff() {
        let config = obj(deployment(1));
        let mut live_json = deployment(1);
        live_json["metadata"]["uid"] = json!("1234");
        live_json["metadata"]["creationTimestamp"] = json!("2024-01-01T00:00:00Z");
        live_json["spec"]["progressDeadlineSeconds"] = json!(600);
        live_json["status"] = json!({"replicas": 1});

        let result = diff(Some(&config), Some(&obj(live_json)), &DiffOptions::new()).unwrap();
        assert!(!result.modified);
        assert_eq!(result.normalized_live, result.predicted_live);
    }

    #[test]
    fn test_changed_field_is_a_diff() {
        let result = diff(Some(&obj(deployment(3))), Some(&obj(deployment(1))), &DiffOptions::new()).unwrap();
        assert!(result.modified);
        assert_eq!(predicted(&result)["spec"]["replicas"], json!(3));
    }

    #[test]
    fn test_integral_floats_compare_equal() {
        let mut config = deployment(1);
        config["spec"]["replicas"] = json!(1.0);
        let result = diff(Some(&obj(config)), Some(&obj(deployment(1))), &DiffOptions::new()).unwrap();
        assert!(!result.modified);
    }

    #[test]
    fn test_last_applied_removal_is_a_diff() {
        let mut live = deployment(1);
        live["metadata"]["labels"] = json!({"tier": "web"});
        live["metadata"]["annotations"] = json!({
            "kubectl.kubernetes.io/last-applied-configuration": json!({
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": {"name": "guestbook", "labels": {"tier": "web"}},
                "spec": {"replicas": 1}
            }).to_string()
        });

        let result = diff(Some(&obj(deployment(1))), Some(&obj(live.clone())), &DiffOptions::new()).unwrap();
        assert!(result.modified);
        assert_eq!(predicted(&result)["metadata"].get("labels"), None);

        // Without last-applied, a label set only on live is kept.
        live["metadata"].as_object_mut().unwrap().remove("annotations");
        let result = diff(Some(&obj(deployment(1))), Some(&obj(live)), &DiffOptions::new()).unwrap();
        assert!(!result.modified);
    }

    #[test]
    fn test_create_and_delete() {
        let config = obj(deployment(1));
        let created = diff(Some(&config), None, &DiffOptions::new()).unwrap();
        assert!(created.modified);
        assert_eq!(created.normalized_live, b"null");
        assert_eq!(predicted(&created), deployment(1));

        let deleted = diff(None, Some(&config), &DiffOptions::new()).unwrap();
        assert!(!deleted.modified);
        assert_eq!(deleted.predicted_live, b"null");

        let err = diff(None, None, &DiffOptions::new()).unwrap_err();
        assert_eq!(err.to_string(), "unexpected state: both live and config are null objects");
    }

    #[test]
    fn test_secret_string_data_is_folded() {
        let mut secret = obj(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": "creds"},
            "data": {"user": "YWRtaW4=", "empty": null},
            "stringData": {"password": "hunter2"}
        }));
        normalize_object(&mut secret, &DiffOptions::new());
        assert_eq!(
            secret.to_json(),
            json!({
                "apiVersion": "v1",
                "kind": "Secret",
                "metadata": {"name": "creds"},
                "data": {"user": "YWRtaW4=", "empty": "", "password": "aHVudGVyMg=="}
            })
        );
    }

    #[test]
    fn test_role_rules() {
        let role = json!({
            "apiVersion": "rbac.authorization.k8s.io/v1",
            "kind": "ClusterRole",
            "metadata": {"name": "monitoring"},
            "aggregationRule": {"clusterRoleSelectors": [{"matchLabels": {"rbac.example.com/aggregate": "true"}}]},
            "rules": [{"apiGroups": [""], "resources": ["pods"], "verbs": ["get"]}]
        });

        let mut aggregated = obj(role.clone());
        normalize_object(&mut aggregated, &DiffOptions::new().with_ignore_aggregated_roles(true));
        assert_eq!(aggregated.get(&["rules"]), Some(&Value::Null));

        let mut kept = obj(role.clone());
        normalize_object(&mut kept, &DiffOptions::new());
        assert!(matches!(kept.get(&["rules"]), Some(Value::List(rules)) if rules.len() == 1));

        let mut empty = role;
        empty.as_object_mut().unwrap().remove("aggregationRule");
        empty["rules"] = json!([]);
        let mut empty = obj(empty);
        normalize_object(&mut empty, &DiffOptions::new());
        assert_eq!(empty.get(&["rules"]), Some(&Value::Null));
    }

    #[test]
    fn test_endpoints_are_sorted_and_defaulted() {
        let mut live = obj(json!({
            "apiVersion": "v1",
            "kind": "Endpoints",
            "metadata": {"name": "svc"},
            "subsets": [{
                "addresses": [{"ip": "10.0.0.2"}, {"ip": "10.0.0.1"}],
                "ports": [{"port": 80, "protocol": "TCP"}]
            }]
        }));
        let mut config = obj(json!({
            "apiVersion": "v1",
            "kind": "Endpoints",
            "metadata": {"name": "svc"},
            "subsets": [{
                "addresses": [{"ip": "10.0.0.1"}, {"ip": "10.0.0.2"}],
                "ports": [{"port": 80}]
            }]
        }));
        normalize_object(&mut live, &DiffOptions::new());
        normalize_object(&mut config, &DiffOptions::new());
        assert_eq!(live, config);
    }

    #[test]
    fn test_empty_annotations_and_namespace_are_ignored() {
        let mut config = deployment(1);
        config["metadata"]["annotations"] = json!({});
        config["metadata"]["namespace"] = json!("other");
        let result = diff(Some(&obj(config)), Some(&obj(deployment(1))), &DiffOptions::new()).unwrap();
        assert!(!result.modified);
    }

    #[test]
    fn test_diff_array_lengths() {
        let configs = vec![Some(obj(deployment(1)))];
        let err = diff_array(&configs, &[], &DiffOptions::new()).unwrap_err();
        assert!(matches!(err, Error::MismatchedLengths));

        let lives = vec![Some(obj(deployment(2)))];
        let list = diff_array(&configs, &lives, &DiffOptions::new()).unwrap();
        assert_eq!(list.diffs.len(), 1);
        assert!(list.modified);
    }
}
