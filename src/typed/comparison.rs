//! Comparison result types.

use crate::fieldpath::Set;
use std::fmt;

/// Comparison holds the result of comparing two TypedValues.
///
/// No field appears in more than one of the three sets. If all are empty,
/// the objects were equal.
#[derive(Debug, Clone, Default)]
pub struct Comparison {
    /// Fields in the left-hand side but not the right-hand side.
    pub removed: Set,
    /// Fields present on both sides with different values.
    pub modified: Set,
    /// Fields in the right-hand side but not the left-hand side.
    pub added: Set,
}

impl Comparison {
    pub fn new() -> Self {
        Comparison::default()
    }

    pub fn is_same(&self) -> bool {
        self.removed.is_empty() && self.modified.is_empty() && self.added.is_empty()
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections = [
            ("Modified", &self.modified),
            ("Added", &self.added),
            ("Removed", &self.removed),
        ];
        let mut first = true;
        for (title, set) in sections {
            if set.is_empty() {
                continue;
            }
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "- {} Fields:", title)?;
            for path in set.paths() {
                write!(f, "\n  {}", path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fieldpath::Path;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_comparison_display() {
        let mut comp = Comparison::new();
        assert!(comp.is_same());

        comp.modified.insert(&Path::from_field_names(&["spec", "replicas"]));
        comp.added.insert(&Path::from_field_names(&["status"]));
        assert!(!comp.is_same());
        assert_eq!(
            comp.to_string(),
            "- Modified Fields:\n  .spec.replicas\n- Added Fields:\n  .status"
        );
    }
}
