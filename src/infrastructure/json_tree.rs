//! Slash-separated path access into a JSON document tree
//!
//! Mirrors realtime-database semantics: writing `null` deletes, and objects
//! left empty by a delete disappear with it.

use serde_json::{Map, Value};

/// Non-empty segments of `a/b/c`
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

pub fn join(base: &str, field: &str) -> String {
    match (base.trim_end_matches('/'), field.trim_start_matches('/')) {
        ("", field) => field.to_string(),
        (base, "") => base.to_string(),
        (base, field) => format!("{base}/{field}"),
    }
}

pub fn get<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(root, |node, segment| node.as_object()?.get(*segment))
        .filter(|v| !v.is_null())
}

/// Write `value` at `path`, creating intermediate objects. `null` deletes.
pub fn set(root: &mut Value, path: &[&str], value: Value) {
    if value.is_null() {
        remove(root, path);
        return;
    }
    write(root, path, value);
}

fn write(node: &mut Value, path: &[&str], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry((*first).to_string()).or_insert(Value::Null);
        write(child, rest, value);
    }
}

/// Delete whatever is at `path`, pruning parents left empty.
pub fn remove(root: &mut Value, path: &[&str]) {
    let Some((first, rest)) = path.split_first() else {
        *root = Value::Object(Map::new());
        return;
    };
    let Some(map) = root.as_object_mut() else {
        return;
    };
    if rest.is_empty() {
        map.remove(*first);
        return;
    }
    if let Some(child) = map.get_mut(*first) {
        remove(child, rest);
        if child.as_object().is_some_and(Map::is_empty) {
            map.remove(*first);
        }
    }
}
