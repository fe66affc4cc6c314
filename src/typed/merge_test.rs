//! Tests for merging typed values and their field sets.

use pretty_assertions::assert_eq;

use super::compare_test::POD_SPEC_SCHEMA;
use crate::fieldpath::{Path, PathElement};
use crate::typed::{deduced_parseable_type, Parser, TypedValue};
use crate::value::{Field, FieldList, Value};

fn pod_spec(yaml: &str) -> TypedValue {
    let parser = Parser::new(POD_SPEC_SCHEMA).unwrap();
    parser.type_by_name("podSpec").from_yaml(yaml).unwrap()
}

fn container(name: &str) -> PathElement {
    PathElement::key(FieldList::with_fields(vec![Field {
        name: "name".into(),
        value: Value::from(name),
    }]))
}

fn merged(lhs: &str, rhs: &str) -> Value {
    pod_spec(lhs).merge(&pod_spec(rhs)).unwrap().into_value()
}

#[test]
fn test_associative_list_merges_by_key() {
    let result = merged(
        r#"
containers:
- {name: app, image: app:1, resources: {cpu: 1}}
- {name: sidecar, image: proxy:1}
"#,
        r#"
containers:
- {name: init, image: busybox}
- {name: app, image: app:2}
"#,
    );
    let expected = pod_spec(
        r#"
containers:
- {name: app, image: app:2, resources: {cpu: 1}}
- {name: sidecar, image: proxy:1}
- {name: init, image: busybox}
"#,
    );
    assert_eq!(&result, expected.value());
}

#[test]
fn test_atomic_values_are_replaced() {
    let result = merged(
        "{args: [a, b], containers: [{name: app, resources: {cpu: 1, memory: 2}}]}",
        "{args: [c], containers: [{name: app, resources: {cpu: 2}}]}",
    );
    let expected = pod_spec("{args: [c], containers: [{name: app, resources: {cpu: 2}}]}");
    assert_eq!(&result, expected.value());
}

#[test]
fn test_separable_maps_merge_and_null_keeps_left() {
    let result = merged(
        "{nodeSelector: {zone: a, disk: ssd}, finalizers: [x]}",
        "{nodeSelector: {zone: b}, finalizers: null}",
    );
    let expected = pod_spec("{nodeSelector: {zone: b, disk: ssd}, finalizers: [x]}");
    assert_eq!(&result, expected.value());
}

#[test]
fn test_deduced_lists_are_atomic() {
    let pt = deduced_parseable_type();
    let lhs = pt.from_yaml("{items: [1, 2], meta: {a: 1}}").unwrap();
    let rhs = pt.from_yaml("{items: [3], meta: {b: 2}}").unwrap();
    let expected = pt.from_yaml("{items: [3], meta: {a: 1, b: 2}}").unwrap();
    assert_eq!(lhs.merge(&rhs).unwrap().value(), expected.value());
}

#[test]
fn test_field_set_covers_leaves_and_list_items() {
    let set = pod_spec(
        r#"
containers:
- {name: app, image: app:1, resources: {cpu: 1}}
args: [a]
nodeSelector: {}
"#,
    )
    .to_field_set();

    let app = Path::from_field_names(&["containers"]).with(container("app"));
    assert!(set.has(&app));
    assert!(set.has(&app.with(PathElement::field_name("image"))));
    assert!(set.has(&app.with(PathElement::field_name("resources"))));
    assert!(!set.has(&app.with(PathElement::field_name("resources")).with(PathElement::field_name("cpu"))));
    assert!(set.has(&Path::from_field_names(&["args"])));
    assert!(set.has(&Path::from_field_names(&["nodeSelector"])));
    assert!(!set.has(&Path::from_field_names(&["containers"])));
}
