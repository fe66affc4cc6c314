//! Removal of fields owned by trusted managers.
//!
//! When another controller (an HPA scaling `spec.replicas`, say) owns a field
//! that differs between live and desired, the difference is expected. Both
//! copies drop every such field so it no longer shows up in the diff.

use tracing::debug;

use crate::error::{Error, Result};
use crate::object::{entry_field_set, Unstructured};
use crate::typed::{ParseableType, TypedValue};

struct TypedResults {
    live: TypedValue,
    config: TypedValue,
    modified: crate::fieldpath::Set,
}

fn typed_results(live: &Unstructured, config: &Unstructured, pt: &ParseableType) -> Result<TypedResults> {
    let typed_live = pt.from_value(live.clone().into_value())?;
    let typed_config = pt.from_value(config.clone().into_value())?;
    let comparison = typed_live
        .compare(&typed_config)
        .map_err(|e| Error::Schema(e.into()))?;
    Ok(TypedResults {
        live: typed_live,
        config: typed_config,
        modified: comparison.modified,
    })
}

/// Removes from copies of `live` and `config` the modified fields owned by
/// any of `trusted_managers` in live's managed fields.
///
/// Returns `(None, None)` when there are no trusted managers or a side is
/// missing. Objects that cannot be typed come back as unmodified copies.
pub fn normalize(
    live: Option<&Unstructured>,
    config: Option<&Unstructured>,
    trusted_managers: &[String],
    pt: &ParseableType,
) -> Result<(Option<Unstructured>, Option<Unstructured>)> {
    if trusted_managers.is_empty() {
        return Ok((None, None));
    }
    let (Some(live), Some(config)) = (live, config) else {
        return Ok((None, None));
    };

    let mut results = match typed_results(live, config, pt) {
        Ok(results) => results,
        Err(e) => {
            debug!(error = %e, resource = %live, "error building typed results");
            return Ok((Some(live.clone()), Some(config.clone())));
        }
    };

    let mut normalized = false;
    for entry in live.managed_fields()? {
        let manager = entry.manager.as_deref().unwrap_or_default();
        if !trusted_managers.iter().any(|m| m == manager) {
            continue;
        }
        let owned = entry_field_set(&entry)
            .map_err(|e| Error::normalizer(format!("error normalizing manager {}", manager), e))?;
        let intersection = owned.intersection(&results.modified);
        results.live = results.live.remove_items(&intersection);
        results.config = results.config.remove_items(&intersection);
        normalized = true;
    }

    if !normalized {
        return Ok((Some(live.clone()), Some(config.clone())));
    }
    Ok((
        Some(Unstructured::from_value(results.live.into_value())?),
        Some(Unstructured::from_value(results.config.into_value())?),
    ))
}
