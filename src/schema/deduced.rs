//! The deduced schema used when no schema is registered for a kind.
//!
//! Maps are separable and recurse into themselves; lists and anything below
//! them are atomic.

use super::elements::{Atom, ElementRelationship, List, Map, Scalar, Schema, TypeDef, TypeRef};

pub const UNTYPED_ATOMIC: &str = "__untyped_atomic_";
pub const UNTYPED_DEDUCED: &str = "__untyped_deduced_";

fn untyped(list_elem: &str, map_elem: &str, map_relationship: ElementRelationship) -> Atom {
    Atom {
        scalar: Some(Scalar::Untyped),
        list: Some(List {
            element_type: TypeRef::named(list_elem),
            element_relationship: ElementRelationship::Atomic,
            keys: Vec::new(),
        }),
        map: Some(Map::with_element_type(TypeRef::named(map_elem), map_relationship)),
    }
}

/// Builds the deduced schema.
pub fn deduced_schema() -> Schema {
    Schema::with_types(vec![
        TypeDef {
            name: UNTYPED_ATOMIC.to_string(),
            atom: untyped(UNTYPED_ATOMIC, UNTYPED_ATOMIC, ElementRelationship::Atomic),
        },
        TypeDef {
            name: UNTYPED_DEDUCED.to_string(),
            atom: untyped(UNTYPED_ATOMIC, UNTYPED_DEDUCED, ElementRelationship::Separable),
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deduced_schema_shape() {
        let schema = deduced_schema();
        let atom = schema.resolve(&TypeRef::named(UNTYPED_DEDUCED)).unwrap();
        assert_eq!(
            atom.list.unwrap().element_relationship,
            ElementRelationship::Atomic
        );
        assert_eq!(
            atom.map.unwrap().element_type,
            TypeRef::named(UNTYPED_DEDUCED)
        );
    }
}
