//! Value module - In-memory representation of YAML/JSON objects.
//!
//! This module provides the tagged-union object tree, its JSON conversions
//! and the merge-patch helpers the structural diff is built on.

mod json;
pub mod patch;
mod value;

pub use json::canonicalize_json_numbers;
pub use value::*;
