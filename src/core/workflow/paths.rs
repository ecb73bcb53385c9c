//! Dotted parameter paths (`inputs.p1.a`, `outputs.p2`, `resources.any`) and
//! helpers for walking JSON value trees along them.

use serde_json::{Map, Value};

pub const INPUTS: &str = "inputs";
pub const OUTPUTS: &str = "outputs";
pub const RESOURCES: &str = "resources";
pub const INPUT_FILES: &str = "input_files";

const ROOTS: [&str; 4] = [INPUTS, OUTPUTS, RESOURCES, INPUT_FILES];

pub fn split(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

/// Prefix bare parameter paths (`p1`, `p1.a`) with `inputs.`.
pub fn normalise_input_path(path: &str) -> String {
    match path.split('.').next() {
        Some(root) if ROOTS.contains(&root) => path.to_string(),
        _ => format!("{}.{}", INPUTS, path),
    }
}

/// Strip a leading `inputs.` segment, if present.
pub fn strip_inputs_prefix(path: &str) -> &str {
    path.strip_prefix("inputs.").unwrap_or(path)
}

/// Parameter type addressed by an `inputs.` path (`inputs.p1.a` -> `p1`).
pub fn input_type(path: &str) -> Option<&str> {
    let mut parts = path.split('.');
    match (parts.next(), parts.next()) {
        (Some(INPUTS), Some(typ)) if !typ.is_empty() => Some(typ),
        _ => None,
    }
}

/// True when `prefix` equals `path` or is a strict dotted prefix of it.
pub fn is_prefix_of(prefix: &str, path: &str) -> bool {
    path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path.as_bytes()[prefix.len()] == b'.')
}

pub fn depth(path: &str) -> usize {
    split(path).len()
}

/// Look up a nested value. Numeric segments index into arrays.
pub fn get_in<'a>(value: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Assign a nested value, creating intermediate mappings where needed.
pub fn set_in(value: &mut Value, segments: &[&str], new_value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        *value = new_value;
        return;
    };
    let mut current = value;
    for segment in parents {
        current = child_mut(current, segment);
    }
    match current {
        Value::Array(items) => match last.parse::<usize>() {
            Ok(idx) if idx < items.len() => items[idx] = new_value,
            _ => {}
        },
        other => {
            if !other.is_object() {
                *other = Value::Object(Map::new());
            }
            if let Value::Object(map) = other {
                map.insert((*last).to_string(), new_value);
            }
        }
    }
}

fn child_mut<'a>(value: &'a mut Value, segment: &str) -> &'a mut Value {
    let index = segment.parse::<usize>().ok();
    let indexes_array = matches!((&*value, index), (Value::Array(items), Some(i)) if i < items.len());
    if !indexes_array && !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Array(items) => &mut items[index.unwrap_or_default()],
        Value::Object(map) => map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new())),
        other => other,
    }
}
