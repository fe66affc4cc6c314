//! Diff through a predicted server-side apply.
//!
//! Instead of replaying a merge patch, the desired state is applied onto
//! live along the object's schema as the syncing manager, with the field
//! ownership recorded in live's managed fields.

use crate::error::{Error, Result};
use crate::merge::{apply, ManagedFields, ManagerKey};
use crate::object::{Unstructured, LAST_APPLIED_CONFIG_ANNOTATION};
use crate::typed::{SchemaRegistry, TypedValue};

use super::structural::{handle_create_delete, DiffResult};

pub const SYNC_OPTIONS_ANNOTATION: &str = "argocd.argoproj.io/sync-options";
const SERVER_SIDE_APPLY_OPTION: &str = "ServerSideApply=true";

/// Whether the object's sync options ask for server-side apply.
pub fn has_server_side_apply_option(un: &Unstructured) -> bool {
    un.annotation(SYNC_OPTIONS_ANNOTATION)
        .is_some_and(|opts| opts.split(',').any(|opt| opt.trim() == SERVER_SIDE_APPLY_OPTION))
}

/// Diffs `config` against `live` by applying it as `manager` would.
///
/// Creates and deletes are handled like in the structural diff.
pub fn structured_merge_diff(
    config: Option<&Unstructured>,
    live: Option<&Unstructured>,
    registry: &SchemaRegistry,
    manager: &str,
) -> Result<DiffResult> {
    let (Some(config), Some(live)) = (config, live) else {
        return handle_create_delete(config, live);
    };

    let pt = registry.parseable_type(&config.group_kind());
    let typed_live = pt
        .from_value(live.clone().into_value())
        .map_err(|e| Error::diff("error building typed value from live resource", e.into()))?;
    let typed_config = pt
        .from_value(config.clone().into_value())
        .map_err(|e| Error::diff("error building typed value from config resource", e.into()))?;

    let mut managers = ManagedFields::from_entries(&live.managed_fields()?)
        .map_err(|e| Error::diff("error decoding managed fields", e.into()))?;
    let merged = apply(&typed_live, &typed_config, &mut managers, &ManagerKey::apply(manager))
        .map_err(|e| Error::diff("error calculating diff", e.into()))?;

    let Some(merged) = merged else {
        let live_bytes = live.to_json_bytes()?;
        return Ok(DiffResult {
            normalized_live: live_bytes.clone(),
            predicted_live: live_bytes,
            modified: false,
        });
    };

    let predicted = typed_bytes(merged)?;
    let normalized = typed_bytes(typed_live)?;
    Ok(DiffResult {
        modified: predicted != normalized,
        normalized_live: normalized,
        predicted_live: predicted,
    })
}

fn typed_bytes(tv: TypedValue) -> Result<Vec<u8>> {
    let mut un = Unstructured::from_value(tv.into_value())?;
    un.remove(&["metadata", "annotations", LAST_APPLIED_CONFIG_ANNOTATION]);
    un.to_json_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value as Json};

    const MANAGER: &str = "argocd-controller";

    fn obj(json: Json) -> Unstructured {
        Unstructured::from_json(json).unwrap()
    }

    fn deployment(spec: Json) -> Json {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "guestbook", "namespace": "default"},
            "spec": spec
        })
    }

    fn live(spec: Json, owned_by_argocd: Json) -> Unstructured {
        let mut live = deployment(spec);
        live["metadata"]["managedFields"] = json!([{
            "manager": MANAGER,
            "operation": "Apply",
            "apiVersion": "apps/v1",
            "fieldsType": "FieldsV1",
            "fieldsV1": {"f:spec": owned_by_argocd}
        }]);
        obj(live)
    }

    fn predicted(result: &DiffResult) -> Json {
        serde_json::from_slice(&result.predicted_live).unwrap()
    }

    #[test]
    fn test_server_side_apply_option() {
        let mut un = obj(deployment(json!({})));
        assert!(!has_server_side_apply_option(&un));
        un.set_annotation(SYNC_OPTIONS_ANNOTATION, "Prune=false, ServerSideApply=true");
        assert!(has_server_side_apply_option(&un));
        un.set_annotation(SYNC_OPTIONS_ANNOTATION, "ServerSideApply=false");
        assert!(!has_server_side_apply_option(&un));
    }

    #[test]
    fn test_fields_set_by_others_are_not_a_diff() {
        let live = live(
            json!({"replicas": 2, "revisionHistoryLimit": 10}),
            json!({"f:replicas": {}}),
        );
        let config = obj(deployment(json!({"replicas": 2})));

        let result = structured_merge_diff(Some(&config), Some(&live), &SchemaRegistry::new(), MANAGER).unwrap();
        assert!(!result.modified);
        assert_eq!(result.normalized_live, result.predicted_live);
    }

    #[test]
    fn test_changed_field_is_predicted() {
        let live = live(json!({"replicas": 2}), json!({"f:replicas": {}}));
        let config = obj(deployment(json!({"replicas": 3})));

        let result = structured_merge_diff(Some(&config), Some(&live), &SchemaRegistry::new(), MANAGER).unwrap();
        assert!(result.modified);
        assert_eq!(predicted(&result)["spec"]["replicas"], json!(3));
    }

    #[test]
    fn test_field_dropped_from_config_is_pruned() {
        let live = live(
            json!({"replicas": 2, "paused": true}),
            json!({"f:replicas": {}, "f:paused": {}}),
        );
        let config = obj(deployment(json!({"replicas": 2})));

        let result = structured_merge_diff(Some(&config), Some(&live), &SchemaRegistry::new(), MANAGER).unwrap();
        assert!(result.modified);
        assert_eq!(predicted(&result)["spec"], json!({"replicas": 2}));

        // Another manager's fields survive the same change.
        let result = structured_merge_diff(Some(&config), Some(&live), &SchemaRegistry::new(), "other-manager").unwrap();
        assert!(!result.modified);
    }

    #[test]
    fn test_last_applied_annotation_is_dropped_from_prediction() {
        let mut live = live(json!({"replicas": 2}), json!({"f:replicas": {}}));
        live.set_annotation(LAST_APPLIED_CONFIG_ANNOTATION, "{}");
        let config = obj(deployment(json!({"replicas": 3})));

        let result = structured_merge_diff(Some(&config), Some(&live), &SchemaRegistry::new(), MANAGER).unwrap();
        let predicted = predicted(&result);
        assert!(predicted["metadata"]["annotations"].get(LAST_APPLIED_CONFIG_ANNOTATION).is_none());
    }

    #[test]
    fn test_create_and_delete() {
        let config = obj(deployment(json!({"replicas": 1})));
        let created = structured_merge_diff(Some(&config), None, &SchemaRegistry::new(), MANAGER).unwrap();
        assert!(created.modified);
        assert_eq!(created.normalized_live, b"null");
        assert!(structured_merge_diff(None, None, &SchemaRegistry::new(), MANAGER).is_err());
    }
}
