//! JSON merge patch helpers used by the structural diff.
//!
//! Patches follow RFC 7386: objects merge recursively, `null` deletes a key
//! and every other value (arrays included) replaces the target wholesale.

use serde_json::{Map as JsonMap, Value as Json};

/// Builds the merge patch that turns `original` into `modified`.
pub fn create_merge_patch(original: &Json, modified: &Json) -> Json {
    match (original, modified) {
        (Json::Object(orig), Json::Object(modi)) => {
            let mut patch = JsonMap::new();
            for (key, orig_val) in orig {
                match modi.get(key) {
                    None => {
                        patch.insert(key.clone(), Json::Null);
                    }
                    Some(mod_val) if mod_val != orig_val => {
                        patch.insert(key.clone(), create_merge_patch(orig_val, mod_val));
                    }
                    Some(_) => {}
                }
            }
            for (key, mod_val) in modi {
                if !orig.contains_key(key) {
                    patch.insert(key.clone(), mod_val.clone());
                }
            }
            Json::Object(patch)
        }
        _ => modified.clone(),
    }
}

/// Builds a three-way merge patch.
///
/// Additions and changes are computed from `current` to `modified`;
/// deletions only for keys that were in `original` and are gone from
/// `modified`. Keys added to `current` by someone else are left alone.
pub fn create_three_way_merge_patch(original: &Json, modified: &Json, current: &Json) -> Json {
    let mut add_and_change = create_merge_patch(current, modified);
    retain_nulls(&mut add_and_change, false);

    let mut deletions = create_merge_patch(original, modified);
    retain_nulls(&mut deletions, true);

    if deletions.is_object() && add_and_change.is_object() {
        merge_patches(&mut deletions, add_and_change);
        deletions
    } else {
        add_and_change
    }
}

/// Applies a merge patch to `target`.
pub fn apply_merge_patch(target: &mut Json, patch: &Json) {
    json_patch::merge(target, patch);
}

// Keeps only the null entries of a patch (deletions) when `keep` is true,
// drops them otherwise. Nested objects emptied by the filter disappear.
fn retain_nulls(patch: &mut Json, keep: bool) {
    let Json::Object(obj) = patch else {
        return;
    };
    let keys: Vec<String> = obj.keys().cloned().collect();
    for key in keys {
        let remove = match obj.get_mut(&key) {
            Some(Json::Null) => !keep,
            Some(nested @ Json::Object(_)) => {
                let was_empty = nested.as_object().is_some_and(JsonMap::is_empty);
                retain_nulls(nested, keep);
                let now_empty = nested.as_object().is_some_and(JsonMap::is_empty);
                if keep {
                    now_empty
                } else {
                    now_empty && !was_empty
                }
            }
            Some(_) => keep,
            None => false,
        };
        if remove {
            obj.remove(&key);
        }
    }
}

// Merges two patches without interpreting nulls as deletions.
fn merge_patches(base: &mut Json, other: Json) {
    match (base, other) {
        (Json::Object(base_obj), Json::Object(other_obj)) => {
            for (key, other_val) in other_obj {
                match base_obj.get_mut(&key) {
                    Some(base_val @ Json::Object(_)) if other_val.is_object() => {
                        merge_patches(base_val, other_val);
                    }
                    _ => {
                        base_obj.insert(key, other_val);
                    }
                }
            }
        }
        (base, other) => *base = other,
    }
}

/// Removes from `live` every map field that does not appear in `config`.
///
/// Lists are walked element by element; extra trailing live elements are
/// kept so they still show up in a diff.
pub fn remove_map_fields(config: &JsonMap<String, Json>, live: &JsonMap<String, Json>) -> JsonMap<String, Json> {
    let mut result = JsonMap::new();
    for (key, config_val) in config {
        let Some(live_val) = live.get(key) else {
            continue;
        };
        let value = if live_val.is_null() {
            Json::Null
        } else {
            remove_fields(config_val, live_val)
        };
        result.insert(key.clone(), value);
    }
    result
}

/// List counterpart of [`remove_map_fields`].
pub fn remove_list_fields(config: &[Json], live: &[Json]) -> Vec<Json> {
    live.iter()
        .enumerate()
        .map(|(i, live_val)| match config.get(i) {
            Some(config_val) if !live_val.is_null() => remove_fields(config_val, live_val),
            _ => live_val.clone(),
        })
        .collect()
}

fn remove_fields(config: &Json, live: &Json) -> Json {
    match (config, live) {
        (Json::Object(c), Json::Object(l)) => Json::Object(remove_map_fields(c, l)),
        (Json::Array(c), Json::Array(l)) => Json::Array(remove_list_fields(c, l)),
        _ => live.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_create_merge_patch() {
        let orig = json!({"a": 1, "b": {"c": 2, "d": 3}, "e": [1]});
        let modi = json!({"a": 1, "b": {"c": 5}, "e": [1, 2], "f": "x"});
        assert_eq!(
            create_merge_patch(&orig, &modi),
            json!({"b": {"c": 5, "d": null}, "e": [1, 2], "f": "x"})
        );
    }

    #[test]
    fn test_three_way_patch_keeps_foreign_fields() {
        let original = json!({"spec": {"replicas": 1, "paused": true}});
        let modified = json!({"spec": {"replicas": 2}});
        let current = json!({"spec": {"replicas": 1, "paused": true, "defaulted": "x"}});

        let patch = create_three_way_merge_patch(&original, &modified, &current);
        assert_eq!(patch, json!({"spec": {"replicas": 2, "paused": null}}));

        let mut live = current.clone();
        apply_merge_patch(&mut live, &patch);
        assert_eq!(live, json!({"spec": {"replicas": 2, "defaulted": "x"}}));
    }

    #[test]
    fn test_three_way_patch_empty_when_in_sync() {
        let doc = json!({"metadata": {"name": "a"}, "spec": {"x": [1, 2]}});
        let patch = create_three_way_merge_patch(&doc, &doc, &doc);
        assert_eq!(patch, json!({}));
    }

    #[test]
    fn test_remove_map_fields() {
        let config = json!({"spec": {"containers": [{"name": "a"}], "paused": false}});
        let live = json!({
            "spec": {
                "containers": [{"name": "a", "imagePullPolicy": "Always"}, {"name": "b"}],
                "paused": false,
                "schedulerName": "default-scheduler"
            },
            "status": {}
        });
        let result = remove_map_fields(
            config.as_object().unwrap(),
            live.as_object().unwrap(),
        );
        assert_eq!(
            Json::Object(result),
            json!({"spec": {"containers": [{"name": "a"}, {"name": "b"}], "paused": false}})
        );
    }
}
