//! Resolution of the ignore spec that applies to one resource identity.

use std::collections::HashMap;
use tracing::warn;

use crate::normalizers::ResourceMatcher;
use crate::settings::{IgnoreDifference, ResourceIgnoreDifferences, ResourceOverride, WILDCARD_OVERRIDE_KEY};

/// Looks up ignore differences across system overrides and application
/// rules.
#[derive(Debug, Clone, Copy)]
pub struct IgnoreDiffConfig<'a> {
    ignores: &'a [ResourceIgnoreDifferences],
    overrides: &'a HashMap<String, ResourceOverride>,
}

impl<'a> IgnoreDiffConfig<'a> {
    pub fn new(ignores: &'a [ResourceIgnoreDifferences], overrides: &'a HashMap<String, ResourceOverride>) -> Self {
        IgnoreDiffConfig { ignores, overrides }
    }

    /// Returns the fields to ignore for a resource, or `None` when no
    /// override or application rule applies to it.
    ///
    /// An exact override beats the `*/*` override, which beats application
    /// rules. Matching application rules are concatenated in order.
    pub fn has_ignore_difference(&self, group: &str, kind: &str, name: &str, namespace: &str) -> Option<IgnoreDifference> {
        if let Some(found) = self.override_for(group, kind) {
            return Some(found.ignore_differences.clone());
        }

        let mut found: Option<IgnoreDifference> = None;
        for rule in self.ignores {
            let matcher = match ResourceMatcher::from_rule(rule) {
                Ok(matcher) => matcher,
                Err(e) => {
                    warn!(error = %e, group = rule.group.as_str(), kind = rule.kind.as_str(), "skipping ignore rule");
                    continue;
                }
            };
            if !matcher.matches(group, kind, name, namespace) {
                continue;
            }
            let acc = found.get_or_insert_with(IgnoreDifference::default);
            acc.json_pointers.extend(rule.json_pointers.iter().cloned());
            acc.jq_path_expressions.extend(rule.jq_path_expressions.iter().cloned());
            acc.managed_fields_managers
                .extend(rule.managed_fields_managers.iter().cloned());
        }
        found
    }

    fn override_for(&self, group: &str, kind: &str) -> Option<&'a ResourceOverride> {
        let exact = self.overrides.get(&format!("{}/{}", group, kind));
        let core = || group.is_empty().then(|| self.overrides.get(kind)).flatten();
        exact
            .or_else(core)
            .or_else(|| self.overrides.get(WILDCARD_OVERRIDE_KEY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rule(group: &str, kind: &str, pointers: &[&str]) -> ResourceIgnoreDifferences {
        ResourceIgnoreDifferences {
            group: group.into(),
            kind: kind.into(),
            json_pointers: pointers.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    fn ignore_override(pointers: &[&str]) -> ResourceOverride {
        ResourceOverride {
            ignore_differences: IgnoreDifference {
                json_pointers: pointers.iter().map(|p| p.to_string()).collect(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_override_takes_precedence() {
        let ignores = vec![rule("apps", "Deployment", &["/spec/replicas"])];
        let overrides = HashMap::from([("apps/Deployment".to_string(), ignore_override(&["/spec/template"]))]);
        let config = IgnoreDiffConfig::new(&ignores, &overrides);

        let found = config
            .has_ignore_difference("apps", "Deployment", "app", "default")
            .unwrap();
        assert_eq!(found.json_pointers, vec!["/spec/template"]);
    }

    #[test]
    fn test_core_group_bare_kind_override() {
        let overrides = HashMap::from([("ConfigMap".to_string(), ignore_override(&["/data"]))]);
        let config = IgnoreDiffConfig::new(&[], &overrides);

        let found = config.has_ignore_difference("", "ConfigMap", "cm", "default").unwrap();
        assert_eq!(found.json_pointers, vec!["/data"]);
        assert_eq!(config.has_ignore_difference("example.com", "ConfigMap", "", ""), None);
    }

    #[test]
    fn test_wildcard_override() {
        let ignores = vec![rule("apps", "Deployment", &["/spec/replicas"])];
        let overrides = HashMap::from([(WILDCARD_OVERRIDE_KEY.to_string(), ignore_override(&["/status"]))]);
        let config = IgnoreDiffConfig::new(&ignores, &overrides);

        let found = config.has_ignore_difference("apps", "Deployment", "", "").unwrap();
        assert_eq!(found.json_pointers, vec!["/status"]);
    }

    #[test]
    fn test_app_rules_are_unioned() {
        let mut scoped = rule("apps", "Deployment", &["/spec/replicas"]);
        scoped.namespace = "default".into();
        scoped.managed_fields_managers = vec!["kube-controller-manager".into()];
        let ignores = vec![
            scoped,
            rule("*", "Deployment", &["/spec/replicas", "/metadata/labels"]),
            rule("apps", "StatefulSet", &["/spec"]),
        ];
        let overrides = HashMap::new();
        let config = IgnoreDiffConfig::new(&ignores, &overrides);

        let found = config
            .has_ignore_difference("apps", "Deployment", "app", "default")
            .unwrap();
        assert_eq!(
            found.json_pointers,
            vec!["/spec/replicas", "/spec/replicas", "/metadata/labels"]
        );
        assert_eq!(found.managed_fields_managers, vec!["kube-controller-manager"]);

        let other_ns = config
            .has_ignore_difference("apps", "Deployment", "app", "prod")
            .unwrap();
        assert_eq!(other_ns.json_pointers, vec!["/spec/replicas", "/metadata/labels"]);
    }

    #[test]
    fn test_name_mismatch_is_not_matched() {
        let mut named = rule("apps", "Deployment", &["/spec/replicas"]);
        named.name = "guestbook".into();
        let ignores = vec![named];
        let overrides = HashMap::new();
        let config = IgnoreDiffConfig::new(&ignores, &overrides);

        assert!(config.has_ignore_difference("apps", "Deployment", "guestbook", "").is_some());
        assert_eq!(config.has_ignore_difference("apps", "Deployment", "other", ""), None);
    }
}
