//! String size caps applied to raw event payloads before validation,
//! so oversized inputs never inflate stored events or error payloads.

use serde_json::Value;

/// Cap on the `name` field of traces and spans, in bytes of UTF-8.
pub const NAME_CAP: usize = 1024;

/// Cap on any string value inside a span's `data` payload.
pub const DATA_STRING_CAP: usize = 100 * 1024;

/// Appended to a string that was cut at its cap.
pub const TRUNCATION_SUFFIX: &str = "... [truncated]";

/// Caps the `name` field and every string value inside `data` (recursing
/// through nested objects) of a raw event object. All other fields are left
/// untouched. Idempotent.
pub fn truncate_event(value: &mut Value) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };
    if let Some(Value::String(name)) = obj.get_mut("name") {
        truncate_string(name, NAME_CAP);
    }
    if let Some(data) = obj.get_mut("data") {
        truncate_data(data);
    }
}

fn truncate_data(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for v in map.values_mut() {
                truncate_data(v);
            }
        }
        Value::String(s) => truncate_string(s, DATA_STRING_CAP),
        // Numbers, booleans, arrays and null pass through; array elements
        // are not individually truncated.
        _ => {}
    }
}

fn truncate_string(s: &mut String, cap: usize) {
    if s.len() <= cap {
        return;
    }
    // A string that was already cut at this cap carries the suffix within
    // the grace window; cutting it again would produce a different result.
    if s.len() <= cap + TRUNCATION_SUFFIX.len() && s.ends_with(TRUNCATION_SUFFIX) {
        return;
    }
    let mut end = cap;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
    s.push_str(TRUNCATION_SUFFIX);
}
