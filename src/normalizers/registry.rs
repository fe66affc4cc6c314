//! Named types that fields can be remarshaled through.

use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::autoscaling::v2 as autoscalingv2;
use k8s_openapi::api::batch::v1 as batchv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::networking::v1 as networkingv1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use super::duration::canonical_duration;
use super::quantity::canonical_quantity;
use crate::value::{canonicalize_json_numbers, Value};

type Json = serde_json::Value;

/// Converts a value into its canonical encoding or explains why it cannot be
/// decoded as the type.
pub type RemarshalFn = fn(&Value) -> Result<Value, String>;

/// A registered type.
#[derive(Clone)]
pub struct KnownType {
    name: String,
    remarshal: RemarshalFn,
}

impl KnownType {
    pub fn new(name: impl Into<String>, remarshal: RemarshalFn) -> Self {
        KnownType {
            name: name.into(),
            remarshal,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn remarshal(&self, value: &Value) -> Result<Value, String> {
        (self.remarshal)(value)
    }
}

impl fmt::Debug for KnownType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KnownType").field(&self.name).finish()
    }
}

/// KnownTypeRegistry maps type names such as `core/v1/PodSpec` to their
/// remarshal function. The default registry holds the Kubernetes types.
#[derive(Debug, Clone)]
pub struct KnownTypeRegistry {
    types: HashMap<String, KnownType>,
}

impl Default for KnownTypeRegistry {
    fn default() -> Self {
        let mut registry = KnownTypeRegistry::empty();
        registry.register("core/Quantity", remarshal_quantity);
        registry.register("meta/v1/Duration", remarshal_duration);
        registry.register("meta/v1/LabelSelector", typed::<metav1::LabelSelector>);

        registry.register("core/v1/PodSpec", |v| remarshal_with::<corev1::PodSpec>(v, pod_spec_quantities));
        registry.register("core/v1/PodTemplateSpec", |v| {
            remarshal_with::<corev1::PodTemplateSpec>(v, pod_template_quantities)
        });
        registry.register("core/v1/Container", |v| remarshal_with::<corev1::Container>(v, container_quantities));
        registry.register("core/v1/ResourceRequirements", |v| {
            remarshal_with::<corev1::ResourceRequirements>(v, resource_list_quantities)
        });
        registry.register("core/v1/Volume", |v| remarshal_with::<corev1::Volume>(v, volume_quantities));
        registry.register("core/v1/PersistentVolumeClaimSpec", |v| {
            remarshal_with::<corev1::PersistentVolumeClaimSpec>(v, claim_spec_quantities)
        });
        registry.register("core/v1/Probe", typed::<corev1::Probe>);
        registry.register("core/v1/EnvVar", typed::<corev1::EnvVar>);
        registry.register("core/v1/ContainerPort", typed::<corev1::ContainerPort>);
        registry.register("core/v1/Affinity", typed::<corev1::Affinity>);
        registry.register("core/v1/Toleration", typed::<corev1::Toleration>);
        registry.register("core/v1/ServiceSpec", typed::<corev1::ServiceSpec>);
        registry.register("core/v1/ServicePort", typed::<corev1::ServicePort>);

        registry.register("apps/v1/DeploymentSpec", |v| {
            remarshal_with::<appsv1::DeploymentSpec>(v, workload_quantities)
        });
        registry.register("apps/v1/StatefulSetSpec", |v| {
            remarshal_with::<appsv1::StatefulSetSpec>(v, stateful_set_quantities)
        });
        registry.register("apps/v1/DaemonSetSpec", |v| {
            remarshal_with::<appsv1::DaemonSetSpec>(v, workload_quantities)
        });
        registry.register("batch/v1/JobSpec", |v| remarshal_with::<batchv1::JobSpec>(v, workload_quantities));
        registry.register("batch/v1/CronJobSpec", |v| {
            remarshal_with::<batchv1::CronJobSpec>(v, cron_job_quantities)
        });
        registry.register("networking/v1/IngressSpec", typed::<networkingv1::IngressSpec>);
        registry.register(
            "autoscaling/v2/HorizontalPodAutoscalerSpec",
            typed::<autoscalingv2::HorizontalPodAutoscalerSpec>,
        );
        registry
    }
}

impl KnownTypeRegistry {
    /// Creates the registry of Kubernetes types.
    pub fn new() -> Self {
        KnownTypeRegistry::default()
    }

    /// Creates a registry with no types.
    pub fn empty() -> Self {
        KnownTypeRegistry {
            types: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, remarshal: RemarshalFn) {
        self.types.insert(name.to_string(), KnownType::new(name, remarshal));
    }

    pub fn get(&self, name: &str) -> Option<&KnownType> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn quantity_string(v: &Json) -> Option<String> {
    match v {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn remarshal_quantity(v: &Value) -> Result<Value, String> {
    let json = v.to_json();
    let s = quantity_string(&json).ok_or_else(|| format!("cannot decode {} as a quantity", v.type_name()))?;
    canonical_quantity(&s)
        .map(Value::String)
        .ok_or_else(|| format!("quantities must match the regular expression '^([+-]?[0-9.]+)([eEinumkKMGTP]*[-+]?[0-9]*)$', got '{}'", s))
}

fn remarshal_duration(v: &Value) -> Result<Value, String> {
    let s = v
        .as_str()
        .ok_or_else(|| format!("cannot decode {} as a duration", v.type_name()))?;
    canonical_duration(s)
        .map(Value::String)
        .ok_or_else(|| format!("time: invalid duration \"{}\"", s))
}

/// Decodes into `T` and encodes it back.
fn typed<T: DeserializeOwned + Serialize>(v: &Value) -> Result<Value, String> {
    remarshal_with::<T>(v, |_| Ok(()))
}

/// Like [`typed`], with a pass over the quantities the type carries. The
/// pass runs before decoding so numeric quantities are accepted.
fn remarshal_with<T: DeserializeOwned + Serialize>(
    v: &Value,
    quantities: fn(&mut Json) -> Result<(), String>,
) -> Result<Value, String> {
    let mut json = v.to_json();
    canonicalize_json_numbers(&mut json);
    quantities(&mut json)?;
    let decoded: T = serde_json::from_value(json).map_err(|e| e.to_string())?;
    let encoded = serde_json::to_value(&decoded).map_err(|e| e.to_string())?;
    Ok(Value::from(encoded))
}

fn canonicalize_quantity_in_place(v: &mut Json) -> Result<(), String> {
    let Some(s) = quantity_string(v) else {
        return Ok(());
    };
    let canonical = canonical_quantity(&s).ok_or_else(|| format!("invalid quantity '{}'", s))?;
    *v = Json::String(canonical);
    Ok(())
}

fn quantity_map(v: Option<&mut Json>) -> Result<(), String> {
    if let Some(Json::Object(map)) = v {
        for q in map.values_mut() {
            canonicalize_quantity_in_place(q)?;
        }
    }
    Ok(())
}

fn each_item(v: Option<&mut Json>, f: fn(&mut Json) -> Result<(), String>) -> Result<(), String> {
    if let Some(Json::Array(items)) = v {
        for item in items {
            f(item)?;
        }
    }
    Ok(())
}

fn resource_list_quantities(requirements: &mut Json) -> Result<(), String> {
    quantity_map(requirements.get_mut("limits"))?;
    quantity_map(requirements.get_mut("requests"))
}

fn container_quantities(container: &mut Json) -> Result<(), String> {
    match container.get_mut("resources") {
        Some(resources) => resource_list_quantities(resources),
        None => Ok(()),
    }
}

fn volume_quantities(volume: &mut Json) -> Result<(), String> {
    if let Some(limit) = volume.pointer_mut("/emptyDir/sizeLimit") {
        canonicalize_quantity_in_place(limit)?;
    }
    Ok(())
}

fn pod_spec_quantities(spec: &mut Json) -> Result<(), String> {
    for key in ["containers", "initContainers", "ephemeralContainers"] {
        each_item(spec.get_mut(key), container_quantities)?;
    }
    each_item(spec.get_mut("volumes"), volume_quantities)?;
    quantity_map(spec.get_mut("overhead"))
}

fn pod_template_quantities(template: &mut Json) -> Result<(), String> {
    match template.get_mut("spec") {
        Some(spec) => pod_spec_quantities(spec),
        None => Ok(()),
    }
}

fn workload_quantities(spec: &mut Json) -> Result<(), String> {
    match spec.get_mut("template") {
        Some(template) => pod_template_quantities(template),
        None => Ok(()),
    }
}

fn claim_spec_quantities(spec: &mut Json) -> Result<(), String> {
    match spec.get_mut("resources") {
        Some(resources) => resource_list_quantities(resources),
        None => Ok(()),
    }
}

fn stateful_set_quantities(spec: &mut Json) -> Result<(), String> {
    workload_quantities(spec)?;
    if let Some(Json::Array(claims)) = spec.get_mut("volumeClaimTemplates") {
        for claim in claims {
            if let Some(claim_spec) = claim.get_mut("spec") {
                claim_spec_quantities(claim_spec)?;
            }
        }
    }
    Ok(())
}

fn cron_job_quantities(spec: &mut Json) -> Result<(), String> {
    match spec.pointer_mut("/jobTemplate/spec") {
        Some(job) => workload_quantities(job),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn remarshal(name: &str, v: Json) -> Result<Json, String> {
        let registry = KnownTypeRegistry::new();
        registry
            .get(name)
            .unwrap_or_else(|| panic!("{} not registered", name))
            .remarshal(&Value::from(v))
            .map(|v| v.to_json())
    }

    #[test]
    fn test_default_registry_contents() {
        let registry = KnownTypeRegistry::new();
        for name in [
            "core/Quantity",
            "meta/v1/Duration",
            "core/v1/PodSpec",
            "core/v1/Container",
            "core/v1/ResourceRequirements",
            "core/v1/PodTemplateSpec",
            "core/v1/Probe",
            "core/v1/EnvVar",
            "core/v1/Volume",
            "core/v1/ServiceSpec",
            "apps/v1/DeploymentSpec",
            "apps/v1/StatefulSetSpec",
            "apps/v1/DaemonSetSpec",
            "batch/v1/JobSpec",
            "meta/v1/LabelSelector",
        ] {
            assert!(registry.contains(name), "{}", name);
        }
        assert!(KnownTypeRegistry::empty().names().is_empty());
    }

    #[test]
    fn test_quantity_and_duration() {
        assert_eq!(remarshal("core/Quantity", json!("1.25G")).unwrap(), json!("1250M"));
        assert_eq!(remarshal("core/Quantity", json!(2)).unwrap(), json!("2"));
        assert_eq!(remarshal("meta/v1/Duration", json!("8760h")).unwrap(), json!("8760h0m0s"));
        assert!(remarshal("core/Quantity", json!("lots")).is_err());
        assert!(remarshal("meta/v1/Duration", json!(5)).is_err());
    }

    #[test]
    fn test_container_resources_are_canonicalized() {
        let out = remarshal(
            "core/v1/Container",
            json!({
                "name": "app",
                "resources": {"requests": {"cpu": 0.5, "memory": "0.5Gi"}, "limits": {"cpu": "1000m"}}
            }),
        )
        .unwrap();
        assert_eq!(
            out,
            json!({
                "name": "app",
                "resources": {"requests": {"cpu": "500m", "memory": "512Mi"}, "limits": {"cpu": "1"}}
            })
        );
    }

    #[test]
    fn test_pod_spec_drops_unknown_fields() {
        let out = remarshal(
            "core/v1/PodSpec",
            json!({
                "containers": [{"name": "app", "image": "nginx", "resources": {"limits": {"memory": "1536Mi"}}}],
                "notAField": true
            }),
        )
        .unwrap();
        assert_eq!(
            out,
            json!({"containers": [{"name": "app", "image": "nginx", "resources": {"limits": {"memory": "1536Mi"}}}]})
        );
    }

    #[test]
    fn test_wrong_shape_fails() {
        assert!(remarshal("core/v1/PodSpec", json!({"containers": "nope"})).is_err());
    }
}
