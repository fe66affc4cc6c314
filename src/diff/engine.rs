//! Entry points diffing an application's live state against its target
//! state.

use std::collections::HashMap;
use tracing::{debug, Span};

use super::cache::ResourceDiff;
use super::config::DiffConfig;
use super::structural::{diff, diff_array, DiffOptions, DiffResult, DiffResultList};
use super::tracking::normalize_tracking;
use crate::error::{Error, Result};
use crate::normalizers::{normalize_managed_fields, CompositeNormalizer, IgnoreNormalizer, KnownTypesNormalizer, Normalizer};
use crate::object::{ResourceKey, Unstructured};

/// Engine-owned copies of live and target objects, positionally aligned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizationResult {
    pub lives: Vec<Option<Unstructured>>,
    pub targets: Vec<Option<Unstructured>>,
}

/// Builds the normalizer chain applied to both sides of every diff.
pub fn new_diff_normalizer(config: &DiffConfig) -> Result<CompositeNormalizer> {
    let ignore = IgnoreNormalizer::new(config.ignores(), config.overrides(), config.ignore_normalizer_opts().clone())
        .map_err(|e| Error::normalizer("error creating ignore normalizer", e))?;
    let known_types = KnownTypesNormalizer::new(config.overrides(), config.known_types())
        .map_err(|e| Error::normalizer("error creating known types normalizer", e))?;
    Ok(CompositeNormalizer::new(vec![Box::new(ignore), Box::new(known_types)]))
}

/// Copies every pair and applies the normalizations that need both sides:
/// resource tracking, then removal of fields owned by trusted managers.
pub fn pre_diff_normalize(
    lives: &[Option<Unstructured>],
    targets: &[Option<Unstructured>],
    config: &DiffConfig,
) -> Result<NormalizationResult> {
    config.validate()?;
    if lives.len() != targets.len() {
        return Err(Error::MismatchedLengths);
    }

    let resolver = config.ignore_diff_config();
    let mut result = NormalizationResult::default();
    for (live, target) in lives.iter().zip(targets) {
        let mut live = live.clone();
        let mut target = target.clone();

        if let (Some(live), Some(target)) = (live.as_ref(), target.as_mut()) {
            normalize_tracking(target, live, config.app_label_key(), config.tracking_method());
        }

        if let (Some(l), Some(t)) = (live.as_ref(), target.as_ref()) {
            let managers = resolver
                .has_ignore_difference(t.group(), t.kind(), t.name(), t.namespace())
                .map(|ignore| ignore.managed_fields_managers)
                .unwrap_or_default();
            if !managers.is_empty() {
                let pt = config.schema_registry().parseable_type(&t.group_kind());
                let normalized = normalize_managed_fields(Some(l), Some(t), &managers, pt).map_err(|e| {
                    Error::normalizer(format!("error removing non config mutations for resource {}", t), e)
                })?;
                if let (Some(l), Some(t)) = normalized {
                    live = Some(l);
                    target = Some(t);
                }
            }
        }

        result.lives.push(live);
        result.targets.push(target);
    }
    Ok(result)
}

/// Runs [`pre_diff_normalize`] and then the diff normalizer over every
/// present object.
pub fn normalize(
    lives: &[Option<Unstructured>],
    targets: &[Option<Unstructured>],
    config: &DiffConfig,
) -> Result<NormalizationResult> {
    let _entered = config.log_span().map(Span::enter);

    let mut result = pre_diff_normalize(lives, targets, config)?;
    let normalizer = new_diff_normalizer(config)?;
    for un in result.lives.iter_mut().chain(result.targets.iter_mut()).flatten() {
        normalizer
            .normalize(un)
            .map_err(|e| Error::normalizer(format!("error normalizing resource {}", un), e))?;
    }
    Ok(result)
}

/// Diffs every live object against its target.
///
/// Cached diffs are reused when the configuration enables caching and the
/// live resource version has not moved.
pub fn state_diffs(
    lives: &[Option<Unstructured>],
    targets: &[Option<Unstructured>],
    config: &DiffConfig,
) -> Result<DiffResultList> {
    let _entered = config.log_span().map(Span::enter);

    let normalized = pre_diff_normalize(lives, targets, config)
        .map_err(|e| Error::diff("failed to perform pre-diff normalization", e))?;
    let normalizer = new_diff_normalizer(config).map_err(|e| Error::diff("failed to create diff normalizer", e))?;
    let opts = DiffOptions::new()
        .with_normalizer(&normalizer)
        .with_ignore_aggregated_roles(config.ignore_aggregated_roles())
        .with_structured_merge_diff(config.structured_merge_diff())
        .with_manager(config.manager())
        .with_schema_registry(config.schema_registry());

    if let Some(cached) = config.diff_from_cache(config.app_name()) {
        return diff_array_cached(&normalized.targets, &normalized.lives, &cached, &opts)
            .map_err(|e| Error::diff("failed to calculate diff from cache", e));
    }
    diff_array(&normalized.targets, &normalized.lives, &opts).map_err(|e| Error::diff("failed to calculate diff", e))
}

/// Diffs a single pair.
pub fn state_diff(live: Option<&Unstructured>, target: Option<&Unstructured>, config: &DiffConfig) -> Result<DiffResult> {
    let list = state_diffs(&[live.cloned()], &[target.cloned()], config)?;
    let count = list.diffs.len();
    let mut diffs = list.diffs.into_iter();
    match (diffs.next(), diffs.next()) {
        (Some(result), None) => Ok(result),
        _ => Err(Error::UnexpectedResultCount(count)),
    }
}

/// Like [`diff_array`], reusing a cached diff for every resource whose
/// identity and resource version still match.
pub fn diff_array_cached(
    configs: &[Option<Unstructured>],
    lives: &[Option<Unstructured>],
    cached: &[ResourceDiff],
    opts: &DiffOptions<'_>,
) -> Result<DiffResultList> {
    if configs.len() != lives.len() {
        return Err(Error::MismatchedLengths);
    }

    let by_key: HashMap<ResourceKey, &ResourceDiff> = cached.iter().map(|d| (d.resource_key(), d)).collect();
    let mut list = DiffResultList::default();
    for (config, live) in configs.iter().zip(lives) {
        let identity = match (live, config) {
            (Some(live), _) => Some((live.resource_key(), live.resource_version())),
            (None, Some(config)) => Some((config.resource_key(), "")),
            (None, None) => None,
        };
        let reused = identity.and_then(|(key, version)| {
            by_key
                .get(&key)
                .filter(|cached| cached.resource_version == version)
                .map(|cached| {
                    debug!(resource = %key, resource_version = version, "reusing cached diff");
                    cached.to_diff_result()
                })
        });

        let result = match reused {
            Some(result) => result,
            None => diff(config.as_ref(), live.as_ref(), opts)?,
        };
        list.modified |= result.modified;
        list.diffs.push(result);
    }
    Ok(list)
}
