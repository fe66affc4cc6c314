//! Schema module defines the structured-merge-diff schema language.
//!
//! Schemas tell the typed comparison which lists are associative (keyed by
//! fields such as `name`), which containers are atomic and which fields a
//! map has. Without one, objects are compared with the deduced schema.

mod deduced;
mod elements;

pub use deduced::*;
pub use elements::*;
