//! Field path module - Represents sets of field paths in nested objects.
//!
//! Sets are how managed-fields ownership (`FieldsV1`) and typed comparison
//! results are expressed, so the two can be intersected.

mod path;
mod serialize;
mod set;

pub use path::*;
pub use serialize::*;
pub use set::*;
