//! Normalizers rewrite objects in place so that representation differences
//! do not show up as diffs.

mod duration;
mod ignore;
mod known_types;
mod managed_fields;
mod normalize_as;
mod quantity;
mod registry;


pub use duration::canonical_duration;
pub use ignore::{IgnoreNormalizer, ResourceMatcher};
pub use known_types::KnownTypesNormalizer;
pub use managed_fields::normalize as normalize_managed_fields;
pub use normalize_as::{alias_group_kind, NormalizeAsNormalizer, NORMALIZE_AS_ANNOTATION};
pub use quantity::canonical_quantity;
pub use registry::{KnownType, KnownTypeRegistry};

use crate::error::Result;
use crate::object::Unstructured;

/// A Normalizer rewrites one object in place.
pub trait Normalizer {
    fn normalize(&self, un: &mut Unstructured) -> Result<()>;
}

/// Runs a sequence of normalizers in order, stopping at the first error.
#[derive(Default)]
pub struct CompositeNormalizer {
    normalizers: Vec<Box<dyn Normalizer>>,
}

impl CompositeNormalizer {
    pub fn new(normalizers: Vec<Box<dyn Normalizer>>) -> Self {
        CompositeNormalizer { normalizers }
    }

    pub fn push(&mut self, normalizer: Box<dyn Normalizer>) {
        self.normalizers.push(normalizer);
    }

    pub fn len(&self) -> usize {
        self.normalizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.normalizers.is_empty()
    }
}

impl Normalizer for CompositeNormalizer {
    fn normalize(&self, un: &mut Unstructured) -> Result<()> {
        for normalizer in &self.normalizers {
            normalizer.normalize(un)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CompositeNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeNormalizer")
            .field("normalizers", &self.normalizers.len())
            .finish()
    }
}
