use std::collections::HashMap;
use tracing::warn;

use super::Normalizer;
use crate::error::Result;
use crate::object::{GroupKind, Unstructured};
use crate::settings::{parse_override_key, ResourceOverride};

/// Annotation naming the GroupKind an object is normalized as, in override
/// key form.
pub const NORMALIZE_AS_ANNOTATION: &str = "argocd.argoproj.io/normalize-as";

/// Returns the alias recorded on an object, if any.
pub fn alias_group_kind(un: &Unstructured) -> Option<GroupKind> {
    let alias = un.annotation(NORMALIZE_AS_ANNOTATION)?;
    let (group, kind) = parse_override_key(alias).ok()?;
    Some(GroupKind::new(group, kind))
}

/// Tags objects whose override sets `normalizeAs` with the alias annotation.
#[derive(Debug, Clone, Default)]
pub struct NormalizeAsNormalizer {
    aliases: HashMap<GroupKind, String>,
}

impl NormalizeAsNormalizer {
    pub fn new(overrides: &HashMap<String, ResourceOverride>) -> Self {
        let mut aliases = HashMap::new();
        for (key, resource_override) in overrides {
            let Some(alias) = resource_override.normalize_as.as_deref().filter(|a| !a.is_empty()) else {
                continue;
            };
            match parse_override_key(key) {
                Ok((group, kind)) => {
                    aliases.insert(GroupKind::new(group, kind), alias.to_string());
                }
                Err(e) => warn!(error = %e, "skipping normalizeAs of resource override"),
            }
        }
        NormalizeAsNormalizer { aliases }
    }
}

impl Normalizer for NormalizeAsNormalizer {
    fn normalize(&self, un: &mut Unstructured) -> Result<()> {
        let Some(alias) = self.aliases.get(&un.group_kind()) else {
            return Ok(());
        };
        if un.annotation(NORMALIZE_AS_ANNOTATION) != Some(alias.as_str()) {
            un.set_annotation(NORMALIZE_AS_ANNOTATION, alias.clone());
        }
        Ok(())
    }
}
