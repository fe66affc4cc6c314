//! Access to `metadata.managedFields`.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ManagedFieldsEntry;

use super::Unstructured;
use crate::error::Result;
use crate::fieldpath::Set;

impl Unstructured {
    /// Decodes the managed fields entries of this object.
    ///
    /// Objects without `metadata.managedFields` yield an empty list.
    pub fn managed_fields(&self) -> Result<Vec<ManagedFieldsEntry>> {
        match self.get(&["metadata", "managedFields"]) {
            None => Ok(Vec::new()),
            Some(v) if v.is_null() => Ok(Vec::new()),
            Some(v) => Ok(serde_json::from_value(v.to_json())?),
        }
    }
}

/// Decodes the FieldsV1 payload of an entry into a field set.
///
/// An entry without fields owns nothing.
pub fn entry_field_set(entry: &ManagedFieldsEntry) -> Result<Set> {
    match &entry.fields_v1 {
        Some(fields) => Ok(Set::from_fields_v1(&fields.0)?),
        None => Ok(Set::new()),
    }
}
