//! Diff module - decides whether live objects match their desired state.
//!
//! [`state_diffs`] takes positionally aligned live and target lists plus a
//! [`DiffConfig`]. Each pair is copied, normalized on both sides and then
//! either matched against a cached diff or diffed structurally, by merge
//! patch or by a predicted server-side apply.

mod cache;
mod config;
mod engine;
mod resolver;
mod structural;
mod structured_merge;
mod tracking;


pub use cache::{MemoryStateCache, ResourceDiff, StateCache};
pub use config::{DiffConfig, DiffConfigBuilder, DEFAULT_MANAGER};
pub use engine::{
    diff_array_cached, new_diff_normalizer, normalize, pre_diff_normalize, state_diff, state_diffs,
    NormalizationResult,
};
pub use resolver::IgnoreDiffConfig;
pub use structural::{diff, diff_array, normalize_object, DiffOptions, DiffResult, DiffResultList};
pub use structured_merge::{has_server_side_apply_option, structured_merge_diff, SYNC_OPTIONS_ANNOTATION};
pub use tracking::normalize_tracking;
