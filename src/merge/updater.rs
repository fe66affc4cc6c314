//! Forced apply with field ownership tracking.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ManagedFieldsEntry;
use thiserror::Error;

use crate::fieldpath::{SerializeError, Set};
use crate::typed::{TypedValue, ValidationErrors};

const APPLY_OPERATION: &str = "Apply";

/// A manager identity as managed fields entries record it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManagerKey {
    pub manager: String,
    pub operation: String,
}

impl ManagerKey {
    pub fn new(manager: impl Into<String>, operation: impl Into<String>) -> Self {
        ManagerKey {
            manager: manager.into(),
            operation: operation.into(),
        }
    }

    /// The identity `manager` applies under.
    pub fn apply(manager: impl Into<String>) -> Self {
        Self::new(manager, APPLY_OPERATION)
    }
}

impl fmt::Display for ManagerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.manager, self.operation)
    }
}

/// Field sets owned by each manager.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManagedFields {
    sets: BTreeMap<ManagerKey, Set>,
}

impl ManagedFields {
    pub fn new() -> Self {
        ManagedFields::default()
    }

    /// Decodes managed fields entries. Entries of one manager recorded at
    /// several API versions are unioned.
    pub fn from_entries(entries: &[ManagedFieldsEntry]) -> Result<Self, SerializeError> {
        let mut managed = ManagedFields::new();
        for entry in entries {
            let key = ManagerKey::new(
                entry.manager.as_deref().unwrap_or_default(),
                entry.operation.as_deref().unwrap_or_default(),
            );
            let set = match &entry.fields_v1 {
                Some(fields) => Set::from_fields_v1(&fields.0)?,
                None => Set::new(),
            };
            let owned = managed.sets.entry(key).or_default();
            *owned = owned.union(&set);
        }
        Ok(managed)
    }

    pub fn get(&self, key: &ManagerKey) -> Option<&Set> {
        self.sets.get(key)
    }

    /// Replaces the set of `key`, returning the previous one.
    pub fn insert(&mut self, key: ManagerKey, set: Set) -> Option<Set> {
        self.sets.insert(key, set)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ManagerKey, &Set)> {
        self.sets.iter()
    }
}

#[derive(Debug, Clone, Error)]
pub enum ApplyError {
    #[error("{0}")]
    Validation(#[from] ValidationErrors),
}

/// Applies `config` onto `live` as `manager`, overriding conflicts with
/// other managers.
///
/// `managers` is updated with the new ownership. Returns `None` when the
/// apply leaves live unchanged.
pub fn apply(
    live: &TypedValue,
    config: &TypedValue,
    managers: &mut ManagedFields,
    manager: &ManagerKey,
) -> Result<Option<TypedValue>, ApplyError> {
    let merged = live.merge(config)?;
    let config_set = config.to_field_set();

    for (key, set) in managers.sets.iter_mut() {
        if key != manager {
            *set = set.difference(&config_set);
        }
    }
    let previous = managers.insert(manager.clone(), config_set.clone());

    let pruned = match previous {
        Some(previous) => {
            let mut disowned = Set::new();
            previous.difference(&config_set).iterate(|path| {
                let owned_by_other = managers.iter().any(|(key, set)| key != manager && set.has(path));
                if !owned_by_other {
                    disowned.insert(path);
                }
            });
            if disowned.is_empty() {
                merged
            } else {
                merged.remove_items(&disowned)
            }
        }
        None => merged,
    };

    if pruned.value() == live.value() {
        return Ok(None);
    }
    Ok(Some(pruned))
}
