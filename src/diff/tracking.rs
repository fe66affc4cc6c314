//! Propagation of the app-tracking marker from live to desired state.
//!
//! The controller stamps live objects with a label and/or annotation naming
//! their application. Desired manifests may lack it, so it is copied over
//! before diffing to keep it out of the result.

use crate::object::Unstructured;
use crate::settings::{TrackingMethod, TRACKING_ID_ANNOTATION};

/// Copies live's tracking label and/or annotation onto `config`.
pub fn normalize_tracking(config: &mut Unstructured, live: &Unstructured, label_key: &str, method: TrackingMethod) {
    if method.uses_label() && !label_key.is_empty() {
        if let Some(label) = live.label(label_key) {
            let label = label.to_string();
            config.set_label(label_key, label);
        }
    }
    if method.uses_annotation() {
        if let Some(tracking_id) = live.annotation(TRACKING_ID_ANNOTATION) {
            let tracking_id = tracking_id.to_string();
            config.set_annotation(TRACKING_ID_ANNOTATION, tracking_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::DEFAULT_APP_INSTANCE_LABEL_KEY;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn live() -> Unstructured {
        Unstructured::from_json(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {
                "name": "svc",
                "labels": {"app.kubernetes.io/instance": "guestbook"},
                "annotations": {"argocd.argoproj.io/tracking-id": "guestbook:/Service:default/svc"}
            }
        }))
        .unwrap()
    }

    fn config() -> Unstructured {
        Unstructured::from_json(json!({"apiVersion": "v1", "kind": "Service", "metadata": {"name": "svc"}})).unwrap()
    }

    #[test]
    fn test_label_method_copies_label_only() {
        let mut config = config();
        normalize_tracking(&mut config, &live(), DEFAULT_APP_INSTANCE_LABEL_KEY, TrackingMethod::Label);
        assert_eq!(config.label(DEFAULT_APP_INSTANCE_LABEL_KEY), Some("guestbook"));
        assert_eq!(config.annotation(TRACKING_ID_ANNOTATION), None);
    }

    #[test]
    fn test_annotation_and_label_copies_both() {
        let mut config = config();
        normalize_tracking(
            &mut config,
            &live(),
            DEFAULT_APP_INSTANCE_LABEL_KEY,
            TrackingMethod::AnnotationAndLabel,
        );
        assert_eq!(config.label(DEFAULT_APP_INSTANCE_LABEL_KEY), Some("guestbook"));
        assert_eq!(
            config.annotation(TRACKING_ID_ANNOTATION),
            Some("guestbook:/Service:default/svc")
        );
    }

    #[test]
    fn test_untracked_live_leaves_config() {
        let mut config = config();
        let before = config.clone();
        normalize_tracking(&mut config, &before.clone(), DEFAULT_APP_INSTANCE_LABEL_KEY, TrackingMethod::AnnotationAndLabel);
        assert_eq!(config, before);
    }
}
