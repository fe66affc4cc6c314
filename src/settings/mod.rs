//! Settings module - Ignore rules, resource overrides and tracking settings.
//!
//! These types use the same camelCase encoding as the Application CRD and
//! the cluster-wide settings ConfigMap, so they deserialize from either.

mod configmap;

pub use configmap::*;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Label the controller injects to mark objects as belonging to an app.
pub const DEFAULT_APP_INSTANCE_LABEL_KEY: &str = "app.kubernetes.io/instance";

/// Annotation carrying the tracking id with annotation-based tracking.
pub const TRACKING_ID_ANNOTATION: &str = "argocd.argoproj.io/tracking-id";

/// Override key matching every resource.
pub const WILDCARD_OVERRIDE_KEY: &str = "*/*";

/// An application-level ignore rule.
///
/// `group` and `kind` are glob patterns; empty `name`/`namespace` match any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceIgnoreDifferences {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub group: String,
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub json_pointers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub jq_path_expressions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub managed_fields_managers: Vec<String>,
}

/// The fields to ignore for a resource, either from an override or resolved
/// from matching application rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IgnoreDifference {
    pub json_pointers: Vec<String>,
    pub jq_path_expressions: Vec<String>,
    pub managed_fields_managers: Vec<String>,
}

impl IgnoreDifference {
    pub fn is_empty(&self) -> bool {
        self.json_pointers.is_empty()
            && self.jq_path_expressions.is_empty()
            && self.managed_fields_managers.is_empty()
    }
}

/// Remarshals the field at `field` (dot separated) through the named type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownTypeField {
    #[serde(default)]
    pub field: String,
    #[serde(default, rename = "type")]
    pub type_name: String,
}

/// A system-level override keyed by `group/kind`, bare `kind` or `*/*`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceOverride {
    #[serde(deserialize_with = "configmap::deserialize_ignore_difference")]
    pub ignore_differences: IgnoreDifference,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub known_type_fields: Vec<KnownTypeField>,
    /// Override key of the kind this resource should be normalized as.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalize_as: Option<String>,
}

/// How the controller marks objects as belonging to an application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingMethod {
    #[default]
    #[serde(rename = "label")]
    Label,
    #[serde(rename = "annotation")]
    Annotation,
    #[serde(rename = "annotation+label")]
    AnnotationAndLabel,
}

impl TrackingMethod {
    pub fn uses_label(self) -> bool {
        matches!(self, TrackingMethod::Label | TrackingMethod::AnnotationAndLabel)
    }

    pub fn uses_annotation(self) -> bool {
        matches!(self, TrackingMethod::Annotation | TrackingMethod::AnnotationAndLabel)
    }
}

impl FromStr for TrackingMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "label" => Ok(TrackingMethod::Label),
            "annotation" => Ok(TrackingMethod::Annotation),
            "annotation+label" => Ok(TrackingMethod::AnnotationAndLabel),
            other => Err(Error::Config(format!("unknown resource tracking method '{}'", other))),
        }
    }
}

impl fmt::Display for TrackingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrackingMethod::Label => "label",
            TrackingMethod::Annotation => "annotation",
            TrackingMethod::AnnotationAndLabel => "annotation+label",
        };
        f.write_str(s)
    }
}

/// Options for the ignore normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IgnoreNormalizerOpts {
    /// Budget for one JQ program. A program still running when it expires
    /// has its patch skipped, now and on every later use. Zero means no limit.
    pub jq_execution_timeout: Duration,
}

impl Default for IgnoreNormalizerOpts {
    fn default() -> Self {
        IgnoreNormalizerOpts {
            jq_execution_timeout: Duration::from_secs(1),
        }
    }
}

/// Splits an override key into group and kind.
///
/// `"apps/Deployment"` gives `("apps", "Deployment")`, a bare `"ConfigMap"`
/// gives the core group.
pub fn parse_override_key(key: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = key.split('/').collect();
    match parts.as_slice() {
        [kind] => Ok((String::new(), kind.to_string())),
        [group, kind] => Ok((group.to_string(), kind.to_string())),
        _ => Err(Error::OverrideKey(key.to_string())),
    }
}

/// Everything the diff engine reads from cluster and app configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiffSettings {
    pub ignores: Vec<ResourceIgnoreDifferences>,
    pub overrides: HashMap<String, ResourceOverride>,
    pub ignore_aggregated_roles: bool,
    pub app_instance_label_key: String,
    pub tracking_method: TrackingMethod,
    pub ignore_normalizer_opts: IgnoreNormalizerOpts,
}

impl Default for DiffSettings {
    fn default() -> Self {
        DiffSettings {
            ignores: Vec::new(),
            overrides: HashMap::new(),
            ignore_aggregated_roles: false,
            app_instance_label_key: DEFAULT_APP_INSTANCE_LABEL_KEY.to_string(),
            tracking_method: TrackingMethod::Label,
            ignore_normalizer_opts: IgnoreNormalizerOpts::default(),
        }
    }
}
