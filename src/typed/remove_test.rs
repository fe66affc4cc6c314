//! Tests for removing field sets from typed values.

use pretty_assertions::assert_eq;
use serde_json::json;

use super::compare_test::POD_SPEC_SCHEMA;
use crate::fieldpath::{Path, PathElement, Set};
use crate::typed::{deduced_parseable_type, Parser};
use crate::value::{Field, FieldList, Value};

fn set_of(paths: Vec<Path>) -> Set {
    let mut set = Set::new();
    for p in &paths {
        set.insert(p);
    }
    set
}

#[test]
fn test_remove_leaves_from_deduced_object() {
    let pt = deduced_parseable_type();
    let tv = pt
        .from_value(Value::from(json!({
            "spec": {"replicas": 3, "revisionHistoryLimit": 10, "paused": false}
        })))
        .unwrap();

    let removed = tv.remove_items(&set_of(vec![
        Path::from_field_names(&["spec", "replicas"]),
        Path::from_field_names(&["spec", "revisionHistoryLimit"]),
    ]));
    assert_eq!(removed.value().to_json(), json!({"spec": {"paused": false}}));
}

#[test]
fn test_remove_missing_path_is_noop() {
    let pt = deduced_parseable_type();
    let tv = pt.from_value(Value::from(json!({"a": {"b": 1}}))).unwrap();
    let removed = tv.remove_items(&set_of(vec![Path::from_field_names(&["a", "c"])]));
    assert_eq!(removed.value(), tv.value());
}

#[test]
fn test_remove_keyed_list_item_field() {
    let parser = Parser::new(POD_SPEC_SCHEMA).unwrap();
    let pt = parser.type_by_name("podSpec");
    let tv = pt
        .from_value(Value::from(json!({
            "containers": [
                {"name": "a", "image": "nginx"},
                {"name": "b", "image": "redis"}
            ]
        })))
        .unwrap();

    let key = PathElement::key(FieldList::with_fields(vec![Field {
        name: "name".into(),
        value: Value::from("b"),
    }]));
    let image = Path::from_field_names(&["containers"])
        .with(key)
        .with(PathElement::field_name("image"));

    let removed = tv.remove_items(&set_of(vec![image]));
    assert_eq!(
        removed.value().to_json(),
        json!({"containers": [{"name": "a", "image": "nginx"}, {"name": "b"}]})
    );
}

#[test]
fn test_remove_whole_list_item() {
    let parser = Parser::new(POD_SPEC_SCHEMA).unwrap();
    let pt = parser.type_by_name("podSpec");
    let tv = pt
        .from_value(Value::from(json!({"finalizers": ["x", "y"]})))
        .unwrap();
    let x = Path::from_field_names(&["finalizers"]).with(PathElement::value(Value::from("x")));

    let removed = tv.remove_items(&set_of(vec![x]));
    assert_eq!(removed.value().to_json(), json!({"finalizers": ["y"]}));
}
