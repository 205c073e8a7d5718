//! Field projection and structural comparison of JSON objects

use serde_json::{Map, Value};

/// Null, `false`, zero, and empty strings, arrays or objects are falsy
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Copy the allow-listed fields whose values are truthy
pub fn project(fields: &[String], source: &Value) -> Map<String, Value> {
    project_where(fields, source, is_truthy)
}

/// Copy the allow-listed fields that are present and not null
pub fn project_present(fields: &[String], source: &Value) -> Map<String, Value> {
    project_where(fields, source, |value| !value.is_null())
}

fn project_where(fields: &[String], source: &Value, keep: impl Fn(&Value) -> bool) -> Map<String, Value> {
    let mut out = Map::new();
    for field in fields {
        if let Some(value) = source.get(field).filter(|v| keep(v)) {
            out.insert(field.clone(), value.clone());
        }
    }
    out
}

/// Recursively copy keys from `existing` that `target` does not name.
/// Arrays of the same length are filled element by element, so server
/// generated keys inside list entries (lag ids, member indexes) carry over.
pub fn fill_missing(target: &mut Value, existing: &Value) {
    let (Value::Object(target), Value::Object(existing)) = (target, existing) else {
        return;
    };
    for (key, value) in existing {
        match target.get_mut(key) {
            None => {
                target.insert(key.clone(), value.clone());
            }
            Some(nested @ Value::Object(_)) => fill_missing(nested, value),
            Some(Value::Array(items)) => fill_elements(items, value),
            Some(_) => {}
        }
    }
}

fn fill_elements(items: &mut [Value], existing: &Value) {
    let Some(existing) = existing.as_array() else {
        return;
    };
    if items.len() != existing.len() {
        return;
    }
    for (item, current) in items.iter_mut().zip(existing) {
        fill_missing(item, current);
    }
}

/// `{"old": {..}, "new": {..}}` holding only the keys that differ.
/// Nested objects are compared key by key; an empty object means no difference.
pub fn deep_diff(old: &Value, new: &Value) -> Value {
    if old == new {
        return Value::Object(Map::new());
    }
    match (old, new) {
        (Value::Object(old), Value::Object(new)) => {
            let (old_out, new_out) = diff_maps(old, new);
            let mut out = Map::new();
            if !old_out.is_empty() {
                out.insert("old".to_string(), Value::Object(old_out));
            }
            if !new_out.is_empty() {
                out.insert("new".to_string(), Value::Object(new_out));
            }
            Value::Object(out)
        }
        _ => serde_json::json!({ "old": old, "new": new }),
    }
}

fn diff_maps(old: &Map<String, Value>, new: &Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut old_out = Map::new();
    let mut new_out = Map::new();

    for (key, old_value) in old {
        match new.get(key) {
            Some(new_value) if new_value == old_value => {}
            Some(Value::Object(new_nested)) if old_value.is_object() => {
                let old_nested = old_value.as_object().cloned().unwrap_or_default();
                let (o, n) = diff_maps(&old_nested, new_nested);
                if !o.is_empty() {
                    old_out.insert(key.clone(), Value::Object(o));
                }
                if !n.is_empty() {
                    new_out.insert(key.clone(), Value::Object(n));
                }
            }
            Some(new_value) => {
                old_out.insert(key.clone(), old_value.clone());
                new_out.insert(key.clone(), new_value.clone());
            }
            None => {
                old_out.insert(key.clone(), old_value.clone());
            }
        }
    }
    for (key, new_value) in new {
        if !old.contains_key(key) {
            new_out.insert(key.clone(), new_value.clone());
        }
    }

    (old_out, new_out)
}

pub fn has_changes(old: &Value, new: &Value) -> bool {
    deep_diff(old, new)
        .as_object()
        .map(|diff| !diff.is_empty())
        .unwrap_or(true)
}
