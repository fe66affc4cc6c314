//! # GitOps Diff
//!
//! A resource diff and normalization engine for GitOps reconciliation of
//! Kubernetes objects.
//!
//! For every managed object the engine decides whether the live state
//! matches the desired state despite differences that do not matter:
//! defaulted fields, fields owned by other controllers, alternative
//! encodings of quantities and durations, and deliberately ignored paths.
//!
//! ## Modules
//!
//! - [`value`] - In-memory representation of YAML/JSON objects and merge-patch helpers
//! - [`object`] - Kubernetes objects as untyped maps, with metadata accessors
//! - [`fieldpath`] - Field path sets used for managed-fields ownership
//! - [`schema`] - Type schema definition language for typed comparison
//! - [`typed`] - Values bound to a schema: comparison, merging and field removal
//! - [`merge`] - Server-side apply prediction with field ownership
//! - [`settings`] - Ignore rules, resource overrides and their ConfigMap encoding
//! - [`normalizers`] - Rewrites applied to both sides before diffing
//! - [`diff`] - Diff configuration, structural diff and the engine entry points

pub mod diff;
pub mod error;
pub mod fieldpath;
pub mod merge;
pub mod normalizers;
pub mod object;
pub mod schema;
pub mod settings;
pub mod typed;
pub mod value;

pub use diff::{
    normalize, state_diff, state_diffs, DiffConfig, DiffConfigBuilder, DiffResult, DiffResultList,
    NormalizationResult, ResourceDiff, StateCache,
};
pub use error::{Error, Result};
pub use fieldpath::{Path, PathElement, Set as FieldPathSet};
pub use normalizers::{CompositeNormalizer, Normalizer};
pub use object::{GroupKind, ResourceKey, Unstructured};
pub use settings::{DiffSettings, ResourceIgnoreDifferences, ResourceOverride, TrackingMethod};
pub use typed::{Comparison, SchemaRegistry, TypedValue};
pub use value::Value;
