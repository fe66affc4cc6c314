//! Persisted per-resource diffs and the store they are loaded from.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use super::DiffResult;
use crate::error::{Error, Result};
use crate::object::{ResourceKey, Unstructured};

/// A diff previously computed for one resource of an application.
///
/// It stays valid while the live object's `resourceVersion` still equals
/// `resource_version`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceDiff {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub target_state: String,
    pub live_state: String,
    pub normalized_live_state: String,
    pub predicted_live_state: String,
    pub resource_version: String,
    pub modified: bool,
    pub hook: bool,
}

impl ResourceDiff {
    /// Records a computed diff for the resource identified by `live` or,
    /// when it does not exist yet, by `target`.
    pub fn from_result(live: Option<&Unstructured>, target: Option<&Unstructured>, result: &DiffResult) -> Self {
        let key = live.or(target).map(Unstructured::resource_key).unwrap_or_default();
        let state = |un: Option<&Unstructured>| un.map(|u| u.to_json().to_string()).unwrap_or_default();
        ResourceDiff {
            group: key.group,
            kind: key.kind,
            namespace: key.namespace,
            name: key.name,
            target_state: state(target),
            live_state: state(live),
            normalized_live_state: String::from_utf8_lossy(&result.normalized_live).into_owned(),
            predicted_live_state: String::from_utf8_lossy(&result.predicted_live).into_owned(),
            resource_version: live.map(|u| u.resource_version().to_string()).unwrap_or_default(),
            modified: result.modified,
            hook: false,
        }
    }

    pub fn resource_key(&self) -> ResourceKey {
        ResourceKey::new(&self.group, &self.kind, &self.namespace, &self.name)
    }

    /// Converts the stored states back into a diff result.
    pub fn to_diff_result(&self) -> DiffResult {
        DiffResult {
            normalized_live: self.normalized_live_state.as_bytes().to_vec(),
            predicted_live: self.predicted_live_state.as_bytes().to_vec(),
            modified: self.modified,
        }
    }
}

/// Storage of the managed resources computed for each application.
pub trait StateCache: Send + Sync {
    fn get_app_managed_resources(&self, app_name: &str) -> Result<Vec<ResourceDiff>>;

    fn set_app_managed_resources(&self, app_name: &str, resources: Vec<ResourceDiff>) -> Result<()>;
}

/// A process-local [`StateCache`].
#[derive(Debug, Default)]
pub struct MemoryStateCache {
    apps: RwLock<HashMap<String, Vec<ResourceDiff>>>,
}

impl MemoryStateCache {
    pub fn new() -> Self {
        MemoryStateCache::default()
    }
}

impl StateCache for MemoryStateCache {
    fn get_app_managed_resources(&self, app_name: &str) -> Result<Vec<ResourceDiff>> {
        let apps = self
            .apps
            .read()
            .map_err(|e| Error::Cache(e.to_string()))?;
        apps.get(app_name)
            .cloned()
            .ok_or_else(|| Error::Cache(format!("no managed resources cached for app '{}'", app_name)))
    }

    fn set_app_managed_resources(&self, app_name: &str, resources: Vec<ResourceDiff>) -> Result<()> {
        let mut apps = self
            .apps
            .write()
            .map_err(|e| Error::Cache(e.to_string()))?;
        apps.insert(app_name.to_string(), resources);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_memory_cache_round_trip() {
        let cache = MemoryStateCache::new();
        assert!(matches!(cache.get_app_managed_resources("guestbook"), Err(Error::Cache(_))));

        let diff = ResourceDiff {
            kind: "ConfigMap".into(),
            name: "cm".into(),
            resource_version: "7".into(),
            ..Default::default()
        };
        cache
            .set_app_managed_resources("guestbook", vec![diff.clone()])
            .unwrap();
        assert_eq!(cache.get_app_managed_resources("guestbook").unwrap(), vec![diff]);
    }

    #[test]
    fn test_from_result_keys_on_live_then_target() {
        let live = Unstructured::from_json(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cm", "namespace": "default", "resourceVersion": "42"}
        }))
        .unwrap();
        let result = DiffResult {
            normalized_live: b"{}".to_vec(),
            predicted_live: b"{}".to_vec(),
            modified: false,
        };

        let cached = ResourceDiff::from_result(Some(&live), None, &result);
        assert_eq!(cached.resource_key(), ResourceKey::new("", "ConfigMap", "default", "cm"));
        assert_eq!(cached.resource_version, "42");
        assert_eq!(cached.to_diff_result(), result);

        let created = ResourceDiff::from_result(None, Some(&live), &result);
        assert_eq!(created.resource_version, "");
        assert_eq!(created.live_state, "");
    }
}
