//! Merge module - predicts what a server-side apply makes of a live object.
//!
//! The configuration is merged into live along the schema, ownership of
//! every field it sets moves to the applying manager, and fields that
//! manager set before but no longer does are pruned unless someone else
//! still owns them.

mod updater;

pub use updater::*;
