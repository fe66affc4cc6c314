//! Loading diff settings from the cluster-wide settings ConfigMap data.

use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use super::{DiffSettings, IgnoreDifference, KnownTypeField, ResourceOverride, WILDCARD_OVERRIDE_KEY};
use crate::error::{Error, Result};

pub const RESOURCE_CUSTOMIZATIONS_KEY: &str = "resource.customizations";
pub const RESOURCE_COMPARE_OPTIONS_KEY: &str = "resource.compareoptions";
pub const APP_INSTANCE_LABEL_KEY: &str = "application.instanceLabelKey";
pub const RESOURCE_TRACKING_METHOD_KEY: &str = "application.resourceTrackingMethod";

const CRD_OVERRIDE_KEY: &str = "apiextensions.k8s.io/CustomResourceDefinition";
const CRD_PRESERVE_UNKNOWN_FIELDS: &str = "/spec/preserveUnknownFields";
const STATUS_POINTER: &str = "/status";

/// Contents of `resource.compareoptions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompareOptions {
    pub ignore_aggregated_roles: bool,
    pub ignore_resource_status_field: String,
}

/// `ignoreDifferences` is either an embedded YAML document or a mapping.
#[derive(Deserialize)]
#[serde(untagged)]
enum IgnoreDifferenceRepr {
    Embedded(String),
    Inline(IgnoreDifference),
}

pub(super) fn deserialize_ignore_difference<'de, D>(deserializer: D) -> std::result::Result<IgnoreDifference, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<IgnoreDifferenceRepr>::deserialize(deserializer)? {
        None => Ok(IgnoreDifference::default()),
        Some(IgnoreDifferenceRepr::Inline(diff)) => Ok(diff),
        Some(IgnoreDifferenceRepr::Embedded(doc)) => parse_ignore_difference(&doc).map_err(serde::de::Error::custom),
    }
}

fn parse_ignore_difference(doc: &str) -> Result<IgnoreDifference> {
    if doc.trim().is_empty() {
        return Ok(IgnoreDifference::default());
    }
    Ok(serde_yaml::from_str::<Option<IgnoreDifference>>(doc)?.unwrap_or_default())
}

/// Converts the `<group_kind>` suffix of a split customization key into an
/// override key.
pub fn convert_to_override_key(group_kind: &str) -> Result<String> {
    let parts: Vec<&str> = group_kind.split('_').collect();
    match parts.as_slice() {
        [group, kind] => Ok(format!("{}/{}", group, kind)),
        [_] if !group_kind.is_empty() => Ok(group_kind.to_string()),
        _ => Err(Error::Config(format!(
            "group kind should be in format `resource.customizations.<type>.<group_kind>` or `resource.customizations.<type>.<kind>`, got group kind: '{}'",
            group_kind
        ))),
    }
}

impl DiffSettings {
    /// Builds settings from the data of the settings ConfigMap. Missing keys
    /// keep their defaults.
    pub fn from_config_map_data(data: &BTreeMap<String, String>) -> Result<DiffSettings> {
        let mut settings = DiffSettings::default();

        let compare_options = match data.get(RESOURCE_COMPARE_OPTIONS_KEY) {
            Some(doc) if !doc.trim().is_empty() => {
                serde_yaml::from_str::<Option<CompareOptions>>(doc)?.unwrap_or_default()
            }
            _ => CompareOptions::default(),
        };
        settings.ignore_aggregated_roles = compare_options.ignore_aggregated_roles;
        settings.overrides = resource_overrides(data, &compare_options)?;

        if let Some(key) = data.get(APP_INSTANCE_LABEL_KEY).filter(|k| !k.is_empty()) {
            settings.app_instance_label_key = key.clone();
        }
        if let Some(method) = data.get(RESOURCE_TRACKING_METHOD_KEY) {
            settings.tracking_method = method.parse()?;
        }
        Ok(settings)
    }
}

/// Collects overrides from `resource.customizations`, the split keys and the
/// status handling in the compare options.
pub fn resource_overrides(
    data: &BTreeMap<String, String>,
    compare_options: &CompareOptions,
) -> Result<HashMap<String, ResourceOverride>> {
    let mut overrides = match data.get(RESOURCE_CUSTOMIZATIONS_KEY) {
        Some(doc) if !doc.trim().is_empty() => {
            serde_yaml::from_str::<Option<HashMap<String, ResourceOverride>>>(doc)?.unwrap_or_default()
        }
        _ => HashMap::new(),
    };

    append_split_key_overrides(data, &mut overrides)?;

    match compare_options.ignore_resource_status_field.as_str() {
        "" | "crd" => {
            add_ignored_pointer(&mut overrides, CRD_OVERRIDE_KEY, STATUS_POINTER);
            add_ignored_pointer(&mut overrides, CRD_OVERRIDE_KEY, CRD_PRESERVE_UNKNOWN_FIELDS);
        }
        "all" => {
            add_ignored_pointer(&mut overrides, WILDCARD_OVERRIDE_KEY, STATUS_POINTER);
            info!("Ignore status for all objects");
        }
        "off" | "false" => info!("Not ignoring status for any object"),
        other => {
            add_ignored_pointer(&mut overrides, CRD_OVERRIDE_KEY, STATUS_POINTER);
            warn!(
                value = other,
                "Unrecognized value for ignoreResourceStatusField, ignoring status for CustomResourceDefinitions"
            );
        }
    }
    Ok(overrides)
}

// Keys have the form resource.customizations.<type>.<group_kind>.
fn append_split_key_overrides(
    data: &BTreeMap<String, String>,
    overrides: &mut HashMap<String, ResourceOverride>,
) -> Result<()> {
    for (key, value) in data {
        if !key.starts_with(RESOURCE_CUSTOMIZATIONS_KEY) {
            continue;
        }
        let parts: Vec<&str> = key.splitn(4, '.').collect();
        if parts.len() < 4 {
            continue;
        }

        let mut override_key = convert_to_override_key(parts[3])?;
        if override_key == "all" {
            override_key = WILDCARD_OVERRIDE_KEY.to_string();
        }

        match parts[2] {
            "ignoreDifferences" => {
                let diff = parse_ignore_difference(value)?;
                overrides.entry(override_key).or_default().ignore_differences = diff;
            }
            "knownTypeFields" => {
                let fields: Vec<KnownTypeField> = if value.trim().is_empty() {
                    Vec::new()
                } else {
                    serde_yaml::from_str::<Option<Vec<KnownTypeField>>>(value)?.unwrap_or_default()
                };
                overrides.entry(override_key).or_default().known_type_fields = fields;
            }
            "normalizeAs" => {
                overrides.entry(override_key).or_default().normalize_as = Some(value.trim().to_string());
            }
            // Health scripts, actions and update filters are consumed elsewhere,
            // but the kind still counts as overridden.
            "health" | "useOpenLibs" | "actions" | "ignoreResourceUpdates" => {
                overrides.entry(override_key).or_default();
                debug!(key = key.as_str(), "skipping customization not used for diffing");
            }
            other => {
                return Err(Error::Config(format!(
                    "resource customization type {} not supported",
                    other
                )))
            }
        }
    }
    Ok(())
}

fn add_ignored_pointer(overrides: &mut HashMap<String, ResourceOverride>, key: &str, pointer: &str) {
    overrides
        .entry(key.to_string())
        .or_default()
        .ignore_differences
        .json_pointers
        .push(pointer.to_string());
}
