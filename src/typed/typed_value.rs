//! TypedValue implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::comparison::Comparison;
use super::validation::{ValidationError, ValidationErrors};
use crate::fieldpath::{Path, PathElement, Set};
use crate::schema::{ElementRelationship, List, Map as MapType, Scalar, Schema, TypeRef};
use crate::value::{Field, FieldList, Map, Value};

/// TypedValue is a Value paired with its schema and type.
#[derive(Debug, Clone)]
pub struct TypedValue {
    value: Value,
    type_ref: TypeRef,
    schema: Arc<Schema>,
}

// What a schema type means for one concrete value. A type may allow several
// shapes; the value decides which one applies.
enum Shape {
    Leaf,
    List(List),
    Map(MapType),
}

/// Creates a new TypedValue after validating it conforms to the schema.
pub fn as_typed(
    value: Value,
    schema: Arc<Schema>,
    type_ref: TypeRef,
) -> Result<TypedValue, ValidationErrors> {
    let tv = TypedValue {
        value,
        type_ref,
        schema,
    };
    tv.validate()?;
    Ok(tv)
}

impl TypedValue {
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    fn shape_of(&self, type_ref: &TypeRef, value: &Value) -> Shape {
        let Some(atom) = self.schema.resolve(type_ref) else {
            return Shape::Leaf;
        };
        match value {
            Value::Map(_) => atom.map.map_or(Shape::Leaf, Shape::Map),
            Value::List(_) => atom.list.map_or(Shape::Leaf, Shape::List),
            _ => Shape::Leaf,
        }
    }

    /// Validates the value against the schema.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        self.validate_value(&self.value, &self.type_ref, &Path::new(), &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_value(
        &self,
        value: &Value,
        type_ref: &TypeRef,
        path: &Path,
        errors: &mut ValidationErrors,
    ) {
        if value.is_null() {
            return;
        }
        let Some(atom) = self.schema.resolve(type_ref) else {
            if let Some(name) = &type_ref.named_type {
                errors.add(ValidationError::schema_error(format!(
                    "no type found matching: {}",
                    name
                )));
            }
            return;
        };

        match value {
            Value::Map(fields) => {
                let Some(map) = atom.map.as_ref() else {
                    errors.add(ValidationError::type_mismatch(path.to_string(), expected(&atom), "map"));
                    return;
                };
                for (key, val) in fields.iter() {
                    match map.field_type(key) {
                        Some(ft) => self.validate_value(
                            val,
                            ft,
                            &path.with(PathElement::field_name(key.clone())),
                            errors,
                        ),
                        None => errors.add(ValidationError::unknown_field(path.to_string(), key.clone())),
                    }
                }
            }
            Value::List(items) => {
                let Some(list) = atom.list.as_ref() else {
                    errors.add(ValidationError::type_mismatch(path.to_string(), expected(&atom), "list"));
                    return;
                };
                let mut seen = BTreeMap::new();
                for (i, item) in items.iter().enumerate() {
                    let pe = match list_item_element(item, i, list) {
                        Ok(pe) => pe,
                        Err(e) => {
                            errors.add(e.at(path));
                            continue;
                        }
                    };
                    if !matches!(pe, PathElement::Index(_)) && seen.insert(pe.clone(), i).is_some() {
                        errors.add(ValidationError::duplicate_key(path.to_string(), pe.to_string()));
                    }
                    self.validate_value(item, &list.element_type, &path.with(pe), errors);
                }
            }
            scalar => {
                let valid = match atom.scalar {
                    Some(Scalar::Numeric) => scalar.is_int() || scalar.is_float(),
                    Some(Scalar::String) => scalar.is_string(),
                    Some(Scalar::Boolean) => scalar.is_bool(),
                    Some(Scalar::Untyped) => true,
                    None => false,
                };
                if !valid {
                    errors.add(ValidationError::type_mismatch(
                        path.to_string(),
                        expected(&atom),
                        scalar.type_name(),
                    ));
                }
            }
        }
    }

    /// Compares this TypedValue (left) with another (right).
    pub fn compare(&self, rhs: &TypedValue) -> Result<Comparison, ValidationErrors> {
        if self.type_ref != rhs.type_ref {
            return Err(ValidationErrors::from_error(ValidationError::schema_error(
                "expected objects of the same type",
            )));
        }
        let mut comparison = Comparison::new();
        self.compare_values(&self.value, &rhs.value, &self.type_ref, &Path::new(), &mut comparison);
        Ok(comparison)
    }

    fn compare_values(
        &self,
        lhs: &Value,
        rhs: &Value,
        type_ref: &TypeRef,
        path: &Path,
        comparison: &mut Comparison,
    ) {
        let same_kind = matches!(
            (lhs, rhs),
            (Value::Map(_), Value::Map(_)) | (Value::List(_), Value::List(_))
        );
        if !same_kind {
            if lhs != rhs {
                comparison.modified.insert(path);
            }
            return;
        }

        match (self.shape_of(type_ref, lhs), lhs, rhs) {
            (Shape::Map(map), Value::Map(l), Value::Map(r))
                if map.element_relationship != ElementRelationship::Atomic =>
            {
                self.compare_maps(l, r, &map, path, comparison)
            }
            (Shape::List(list), Value::List(l), Value::List(r))
                if list.element_relationship != ElementRelationship::Atomic =>
            {
                if !self.compare_lists(l, r, &list, path, comparison) && lhs != rhs {
                    comparison.modified.insert(path);
                }
            }
            _ => {
                if lhs != rhs {
                    comparison.modified.insert(path);
                }
            }
        }
    }

    fn compare_maps(&self, lhs: &Map, rhs: &Map, map: &MapType, path: &Path, comparison: &mut Comparison) {
        for (key, lhs_val) in lhs.iter() {
            let field_path = path.with(PathElement::field_name(key.clone()));
            match rhs.get(key) {
                None => comparison.removed.insert(&field_path),
                Some(rhs_val) => {
                    let ft = map.field_type(key).cloned().unwrap_or_default();
                    self.compare_values(lhs_val, rhs_val, &ft, &field_path, comparison);
                }
            }
        }
        for key in rhs.fields.keys().filter(|k| !lhs.has(k)) {
            comparison
                .added
                .insert(&path.with(PathElement::field_name(key.clone())));
        }
    }

    // Returns false when the items can't be keyed, in which case the caller
    // compares the list as a whole.
    fn compare_lists(
        &self,
        lhs: &[Value],
        rhs: &[Value],
        list: &List,
        path: &Path,
        comparison: &mut Comparison,
    ) -> bool {
        let (Ok(lhs_items), Ok(rhs_items)) = (keyed_items(lhs, list), keyed_items(rhs, list)) else {
            return false;
        };
        for (pe, lhs_item) in &lhs_items {
            let item_path = path.with(pe.clone());
            match rhs_items.get(pe) {
                None => comparison.removed.insert(&item_path),
                Some(rhs_item) => {
                    self.compare_values(lhs_item, rhs_item, &list.element_type, &item_path, comparison)
                }
            }
        }
        for pe in rhs_items.keys().filter(|pe| !lhs_items.contains_key(*pe)) {
            comparison.added.insert(&path.with(pe.clone()));
        }
        true
    }

    /// Returns a copy of this value with every path in `items` removed.
    pub fn remove_items(&self, items: &Set) -> TypedValue {
        let value = if items.has(&Path::new()) {
            Value::Null
        } else {
            self.remove_from(&self.value, &self.type_ref, items, &Path::new())
        };
        TypedValue {
            value,
            type_ref: self.type_ref.clone(),
            schema: Arc::clone(&self.schema),
        }
    }

    fn remove_from(&self, value: &Value, type_ref: &TypeRef, items: &Set, path: &Path) -> Value {
        match (self.shape_of(type_ref, value), value) {
            (Shape::Map(map), Value::Map(fields)) => {
                let mut out = Map::new();
                for (key, val) in fields.iter() {
                    let field_path = path.with(PathElement::field_name(key.clone()));
                    if items.has(&field_path) {
                        continue;
                    }
                    let ft = map.field_type(key).cloned().unwrap_or_default();
                    out.set(key.clone(), self.remove_from(val, &ft, items, &field_path));
                }
                Value::Map(out)
            }
            (Shape::List(list), Value::List(values)) => {
                let mut out = Vec::with_capacity(values.len());
                for (i, item) in values.iter().enumerate() {
                    let pe = list_item_element(item, i, &list).unwrap_or(PathElement::Index(i as i32));
                    let item_path = path.with(pe);
                    if items.has(&item_path) {
                        continue;
                    }
                    out.push(self.remove_from(item, &list.element_type, items, &item_path));
                }
                Value::List(out)
            }
            _ => value.clone(),
        }
    }

    /// Merges `rhs` over this value.
    ///
    /// Separable maps merge field by field and associative lists item by
    /// item, keeping the order of the left side with new items appended.
    /// Scalars and atomic containers take the right side. A null on the
    /// right keeps the left.
    pub fn merge(&self, rhs: &TypedValue) -> Result<TypedValue, ValidationErrors> {
        if self.type_ref != rhs.type_ref {
            return Err(ValidationErrors::from_error(ValidationError::schema_error(
                "expected objects of the same type",
            )));
        }
        Ok(TypedValue {
            value: self.merge_values(&self.value, &rhs.value, &self.type_ref),
            type_ref: self.type_ref.clone(),
            schema: Arc::clone(&self.schema),
        })
    }

    fn merge_values(&self, lhs: &Value, rhs: &Value, type_ref: &TypeRef) -> Value {
        if rhs.is_null() {
            return lhs.clone();
        }
        match (self.shape_of(type_ref, rhs), lhs, rhs) {
            (Shape::Map(map), Value::Map(l), Value::Map(r))
                if map.element_relationship != ElementRelationship::Atomic =>
            {
                let mut out = l.clone();
                for (key, rhs_val) in r.iter() {
                    let merged = match l.get(key) {
                        Some(lhs_val) => {
                            let ft = map.field_type(key).cloned().unwrap_or_default();
                            self.merge_values(lhs_val, rhs_val, &ft)
                        }
                        None => rhs_val.clone(),
                    };
                    out.set(key.clone(), merged);
                }
                Value::Map(out)
            }
            (Shape::List(list), Value::List(l), Value::List(r))
                if list.element_relationship == ElementRelationship::Associative =>
            {
                self.merge_lists(l, r, &list).unwrap_or_else(|| rhs.clone())
            }
            _ => rhs.clone(),
        }
    }

    // None when either side can't be keyed.
    fn merge_lists(&self, lhs: &[Value], rhs: &[Value], list: &List) -> Option<Value> {
        let lhs_keys = lhs
            .iter()
            .enumerate()
            .map(|(i, item)| list_item_element(item, i, list))
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        let rhs_keys = rhs
            .iter()
            .enumerate()
            .map(|(i, item)| list_item_element(item, i, list))
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        let mut pending: BTreeMap<&PathElement, &Value> = rhs_keys.iter().zip(rhs).collect();

        let mut out = Vec::with_capacity(lhs.len().max(rhs.len()));
        for (pe, item) in lhs_keys.iter().zip(lhs) {
            match pending.remove(pe) {
                Some(rhs_item) => out.push(self.merge_values(item, rhs_item, &list.element_type)),
                None => out.push(item.clone()),
            }
        }
        for pe in &rhs_keys {
            if let Some(rhs_item) = pending.remove(pe) {
                out.push(rhs_item.clone());
            }
        }
        Some(Value::List(out))
    }

    /// The paths this value sets: leaves, atomic or empty containers, and
    /// the items of associative lists.
    pub fn to_field_set(&self) -> Set {
        let mut set = Set::new();
        self.collect_fields(&self.value, &self.type_ref, &Path::new(), &mut set);
        set
    }

    fn collect_fields(&self, value: &Value, type_ref: &TypeRef, path: &Path, set: &mut Set) {
        match (self.shape_of(type_ref, value), value) {
            (Shape::Map(map), Value::Map(fields))
                if map.element_relationship != ElementRelationship::Atomic && !fields.is_empty() =>
            {
                for (key, val) in fields.iter() {
                    let ft = map.field_type(key).cloned().unwrap_or_default();
                    self.collect_fields(val, &ft, &path.with(PathElement::field_name(key.clone())), set);
                }
            }
            (Shape::List(list), Value::List(items))
                if list.element_relationship != ElementRelationship::Atomic && !items.is_empty() =>
            {
                for (i, item) in items.iter().enumerate() {
                    let pe = list_item_element(item, i, &list).unwrap_or(PathElement::Index(i as i32));
                    let item_path = path.with(pe);
                    if list.element_relationship == ElementRelationship::Associative {
                        set.insert(&item_path);
                    }
                    self.collect_fields(item, &list.element_type, &item_path, set);
                }
            }
            _ => {
                if !path.is_empty() {
                    set.insert(path);
                }
            }
        }
    }
}

fn expected(atom: &crate::schema::Atom) -> &'static str {
    match (&atom.scalar, &atom.list, &atom.map) {
        (Some(Scalar::Numeric), _, _) => "numeric",
        (Some(Scalar::String), _, _) => "string",
        (Some(Scalar::Boolean), _, _) => "boolean",
        (Some(Scalar::Untyped), _, _) => "scalar",
        (None, Some(_), _) => "list",
        (None, None, Some(_)) => "map",
        (None, None, None) => "nothing",
    }
}

/// Computes the path element identifying a list item.
fn list_item_element(item: &Value, index: usize, list: &List) -> Result<PathElement, ValidationError> {
    if list.element_relationship != ElementRelationship::Associative {
        return Ok(PathElement::Index(index as i32));
    }
    if list.keys.is_empty() {
        return Ok(PathElement::Value(item.clone()));
    }
    let Value::Map(map) = item else {
        return Err(ValidationError::invalid_value(
            "",
            "associative list with keys has an element that is not a map",
        ));
    };
    let mut fields = Vec::with_capacity(list.keys.len());
    for key in &list.keys {
        let value = map
            .get(key)
            .ok_or_else(|| ValidationError::missing_field("", key.clone()))?;
        fields.push(Field {
            name: key.clone(),
            value: value.clone(),
        });
    }
    Ok(PathElement::Key(FieldList::with_fields(fields)))
}

fn keyed_items<'a>(
    items: &'a [Value],
    list: &List,
) -> Result<BTreeMap<PathElement, &'a Value>, ValidationError> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| Ok((list_item_element(item, i, list)?, item)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::{deduced_parseable_type, Parser};

    #[test]
    fn test_compare_same() {
        let pt = deduced_parseable_type();
        let a = pt.from_yaml("{a: 1, b: [1, 2]}").unwrap();
        let b = pt.from_yaml("{a: 1, b: [1, 2]}").unwrap();
        assert!(a.compare(&b).unwrap().is_same());
    }

    #[test]
    fn test_compare_kind_change_is_modified() {
        let pt = deduced_parseable_type();
        let a = pt.from_yaml("{a: {b: 1}}").unwrap();
        let b = pt.from_yaml("{a: [1]}").unwrap();
        let cmp = a.compare(&b).unwrap();
        assert!(cmp.modified.has(&Path::from_field_names(&["a"])));
    }

    #[test]
    fn test_validate_unknown_field() {
        let parser = Parser::new(
            r#"types:
- name: pair
  map:
    fields:
    - name: key
      type:
        scalar: string
"#,
        )
        .unwrap();
        let pt = parser.type_by_name("pair");
        assert!(pt.from_yaml("{key: a}").is_ok());
        assert!(pt.from_yaml("{key: a, other: b}").is_err());
        assert!(pt.from_yaml("{key: 1}").is_err());
    }
}
