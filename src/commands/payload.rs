//! Lenient accessors over command payload objects.

use serde_json::{Map, Value};

pub type Payload = Map<String, Value>;

pub fn string(map: &Payload, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn boolean(map: &Payload, key: &str, default: bool) -> bool {
    match map.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => true,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => false,
        _ => default,
    }
}

/// Fractional numbers are truncated toward zero.
#[allow(clippy::cast_possible_truncation)]
pub fn integer(map: &Payload, key: &str) -> Option<i64> {
    match map.get(key)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn object<'a>(map: &'a Payload, key: &str) -> Option<&'a Payload> {
    map.get(key).and_then(Value::as_object)
}

/// String entries of an array field; non-string entries are skipped.
pub fn string_list(map: &Payload, key: &str) -> Vec<String> {
    map.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn booleans_accept_strings_and_default() {
        let p = payload(json!({"a": true, "b": "FALSE", "c": 1}));
        assert!(boolean(&p, "a", false));
        assert!(!boolean(&p, "b", true));
        assert!(boolean(&p, "c", true));
        assert!(!boolean(&p, "missing", false));
    }

    #[test]
    fn integers_accept_numeric_strings() {
        let p = payload(json!({"a": 5, "b": "12", "c": "x", "d": 2.9}));
        assert_eq!(integer(&p, "a"), Some(5));
        assert_eq!(integer(&p, "b"), Some(12));
        assert_eq!(integer(&p, "c"), None);
        assert_eq!(integer(&p, "d"), Some(2));
    }

    #[test]
    fn string_list_skips_non_strings() {
        let p = payload(json!({"packages": ["a", 1, null, "b"]}));
        assert_eq!(string_list(&p, "packages"), vec!["a", "b"]);
        assert!(string_list(&p, "missing").is_empty());
    }
}
