//! Shape-tolerant lookups over loosely-typed upstream payloads.
//!
//! The upstream schema nests the "same" value at different depths and in
//! different shapes (scalar, object, list) across device-firmware
//! generations, so lookups here are shape-tolerant and tree searches are
//! iterative with an explicit stack.

use serde_json::Value;

/// Numeric view of a JSON value, accepting ints, floats, and numeric
/// strings (the upstream occasionally stringifies numbers).
pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Resolve a field that may arrive as a scalar, as `{"value": x}` /
/// `{"actual": x}`, or as a list whose first element holds the value.
pub fn resolve_scalar(value: &Value) -> Option<f64> {
    match value {
        Value::Object(map) => map
            .get("value")
            .or_else(|| map.get("actual"))
            .and_then(value_to_f64),
        Value::Array(arr) => arr.first().and_then(resolve_scalar),
        _ => value_to_f64(value),
    }
}

/// First element of an array payload, or the payload itself when the
/// endpoint returns a bare object.
pub fn first_entry(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(arr) => arr.first(),
        _ => Some(value),
    }
}

/// Search the whole payload tree for the first of `keys` that maps to a
/// numeric value.
///
/// Key priority outranks depth: all occurrences of `keys[0]` anywhere in
/// the tree are preferred over any occurrence of `keys[1]`. Within one
/// key the shallowest match in document order wins. The walk is iterative
/// so pathological payload nesting cannot blow the stack.
pub fn find_first_number(root: &Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        if let Some(v) = find_key(root, key) {
            return Some(v);
        }
    }
    None
}

fn find_key(root: &Value, key: &str) -> Option<f64> {
    let mut stack: Vec<&Value> = vec![root];
    while let Some(value) = stack.pop() {
        match value {
            Value::Object(map) => {
                if let Some(hit) = map.get(key).and_then(resolve_scalar) {
                    return Some(hit);
                }
                // Reverse push keeps document order on the pop side.
                for child in map.values().rev() {
                    stack.push(child);
                }
            }
            Value::Array(arr) => {
                for child in arr.iter().rev() {
                    stack.push(child);
                }
            }
            _ => {}
        }
    }
    None
}
