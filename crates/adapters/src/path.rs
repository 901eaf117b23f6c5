//! Dotted-path lookups and string coercion over JSON values.

use serde_json::Value;

/// Walk `segments` into `value`. Objects are indexed by key, arrays by a
/// numeric segment. Empty segments are ignored.
pub fn lookup_segments<'a, 'p>(
    value: &'a Value,
    segments: impl IntoIterator<Item = &'p str>,
) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        if segment.is_empty() {
            continue;
        }
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Look up a dot-separated path such as `user.emails.0`. An empty path
/// returns `value` itself.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    lookup_segments(value, path.split('.'))
}

/// String form used when a value is spliced into text: strings verbatim,
/// `null` as empty, everything else as compact JSON.
pub fn to_display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Interpolated fields arrive as strings, so an array may be given either
/// directly or as its JSON text.
pub fn coerce_array(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s.trim()) {
            Ok(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

/// Same as [`coerce_array`] for objects.
pub fn coerce_object(value: &Value) -> Option<serde_json::Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s.trim()) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

/// Numeric view of a value, accepting numeric strings.
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn walks_objects_and_arrays() {
        let v = json!({ "user": { "emails": ["a@x", "b@x"] } });
        assert_eq!(lookup(&v, "user.emails.1"), Some(&json!("b@x")));
        assert_eq!(lookup(&v, "user.missing"), None);
        assert_eq!(lookup(&v, "user.emails.9"), None);
        assert_eq!(lookup(&v, ""), Some(&v));
    }

    #[test]
    fn display_string_forms() {
        assert_eq!(to_display_string(&json!(null)), "");
        assert_eq!(to_display_string(&json!("v")), "v");
        assert_eq!(to_display_string(&json!(3)), "3");
        assert_eq!(to_display_string(&json!({ "a": 1 })), r#"{"a":1}"#);
    }

    #[test]
    fn arrays_accept_json_text() {
        assert_eq!(coerce_array(&json!("[1, 2]")), Some(vec![json!(1), json!(2)]));
        assert_eq!(coerce_array(&json!([true])), Some(vec![json!(true)]));
        assert_eq!(coerce_array(&json!("nope")), None);
    }
}
