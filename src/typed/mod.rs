//! Typed module - Operations on Values with specific schemas.
//!
//! This module provides validation, field-level comparison, merging and
//! removal of field sets, which the managed-fields normalizer and the
//! server-side apply prediction build on.

mod comparison;
mod parser;
mod registry;
mod typed_value;
mod validation;


#[cfg(test)]
mod merge_test;

#[cfg(test)]
mod remove_test;

pub use comparison::*;
pub use parser::*;
pub use registry::*;
pub use typed_value::*;
pub use validation::*;
