//! Path-addressable operations over JSON value trees
//!
//! Domain and resource payloads are nested `serde_json::Value` trees.
//! These helpers replace ad hoc string-path access with explicit
//! segment-slice operations.

use serde_json::Value;

/// Get a nested value by object-key path.
pub fn get_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for segment in path {
        current = current.get(*segment)?;
    }
    Some(current)
}

/// Mutable variant of [`get_path`].
pub fn get_path_mut<'a>(value: &'a mut Value, path: &[&str]) -> Option<&'a mut Value> {
    let mut current = value;
    for segment in path {
        current = current.get_mut(*segment)?;
    }
    Some(current)
}

/// Remove a nested value, returning it if the path was present.
pub fn remove_path(value: &mut Value, path: &[&str]) -> Option<Value> {
    let (last, parents) = path.split_last()?;
    get_path_mut(value, parents)?
        .as_object_mut()?
        .remove(*last)
}

/// Overwrite a key that already exists at the given path.
///
/// Never invents intermediate objects or new keys; returns whether the
/// write happened.
pub fn set_existing(value: &mut Value, path: &[&str], new: Value) -> bool {
    let Some((last, parents)) = path.split_last() else {
        return false;
    };
    let Some(parent) = get_path_mut(value, parents) else {
        return false;
    };
    match parent.as_object_mut() {
        Some(map) if map.contains_key(*last) => {
            map.insert((*last).to_string(), new);
            true
        }
        _ => false,
    }
}

/// Recursive merge: objects merge key-by-key, any other overlay value
/// (scalars and whole arrays) replaces the base value.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value.clone(),
    }
}
