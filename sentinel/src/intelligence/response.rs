//! Decoding of language-model replies.
//!
//! Model output is noisy: prose around the JSON, missing keys, wrong value
//! types, confidences outside `[0, 1]`. Every consumer goes through
//! [`ModelReply`] and the field helpers below instead of indexing into raw
//! JSON, so a bad reply degrades to defaults or to [`ModelReply::Invalid`].

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Result of decoding one model reply against a schema.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply<T> {
    Parsed(T),
    Invalid { reason: String },
}

impl<T> ModelReply<T> {
    /// Locate the JSON object in `text` and hand it to `build`, which fills
    /// every field with a default when it is missing or mistyped.
    pub fn decode(text: &str, build: impl FnOnce(&Map<String, Value>) -> T) -> Self {
        match parse_json_object(text) {
            Ok(object) => ModelReply::Parsed(build(&object)),
            Err(reason) => ModelReply::Invalid { reason },
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ModelReply::Invalid { .. })
    }
}

fn object_span() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static regex"))
}

/// Find the outermost `{...}` span in a reply.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }
    object_span().find(text).map(|m| m.as_str().trim())
}

fn parse_json_object(text: &str) -> std::result::Result<Map<String, Value>, String> {
    let span = extract_json_object(text).ok_or_else(|| "no JSON object in reply".to_string())?;
    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(format!("expected a JSON object, got {}", type_name(&other))),
        Err(e) => Err(format!("malformed JSON: {e}")),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Stringify a scalar the way a loose schema expects: strings as-is,
/// numbers and booleans via their JSON text, null and containers as `None`.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Trimmed text of `key`, or `None` when missing, null, non-scalar or blank.
pub fn field_text(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(value_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Confidence of `key` clamped into `[0, 1]`; unparsable values use `default`.
pub fn field_confidence(object: &Map<String, Value>, key: &str, default: f32) -> f32 {
    let raw = match object.get(key) {
        Some(Value::Number(n)) => n.as_f64().map(|v| v as f32),
        Some(Value::String(s)) => s.trim().parse::<f32>().ok(),
        _ => None,
    };
    match raw {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => default,
    }
}

pub fn field_bool(object: &Map<String, Value>, key: &str, default: bool) -> bool {
    match object.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => true,
            "false" | "no" => false,
            _ => default,
        },
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(default),
        _ => default,
    }
}

/// Items of an array field; anything that is not an array yields nothing.
pub fn field_list<'a>(object: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    match object.get(key) {
        Some(Value::Array(items)) => items.as_slice(),
        _ => &[],
    }
}

/// Array of non-blank strings (scalars are stringified).
pub fn field_strings(object: &Map<String, Value>, key: &str) -> Vec<String> {
    field_list(object, key)
        .iter()
        .filter_map(value_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test fixture must be an object"),
        }
    }

    #[test]
    fn test_extract_json_object_from_prose() {
        let reply = "Sure! Here you go:\n{\"a\": 1}\nHope that helps.";
        assert_eq!(extract_json_object(reply), Some("{\"a\": 1}"));
        assert_eq!(extract_json_object("  {\"a\": 1}  "), Some("{\"a\": 1}"));
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object(""), None);
    }

    #[test]
    fn test_decode_invalid_variants() {
        let reply: ModelReply<usize> = ModelReply::decode("not json", |o| o.len());
        assert!(reply.is_invalid());

        let reply: ModelReply<usize> = ModelReply::decode("{broken", |o| o.len());
        assert!(reply.is_invalid());

        let reply: ModelReply<usize> = ModelReply::decode("{\"a\": }", |o| o.len());
        assert!(matches!(reply, ModelReply::Invalid { reason } if reason.starts_with("malformed")));
    }

    #[test]
    fn test_decode_parsed() {
        let reply = ModelReply::decode("```json\n{\"a\": 1, \"b\": 2}\n```", |o| o.len());
        assert_eq!(reply, ModelReply::Parsed(2));
    }

    #[test]
    fn test_field_text_defaults() {
        let o = object(json!({"s": "  x ", "n": 24, "b": true, "blank": "  ", "null": null, "arr": []}));
        assert_eq!(field_text(&o, "s").as_deref(), Some("x"));
        assert_eq!(field_text(&o, "n").as_deref(), Some("24"));
        assert_eq!(field_text(&o, "b").as_deref(), Some("true"));
        assert_eq!(field_text(&o, "blank"), None);
        assert_eq!(field_text(&o, "null"), None);
        assert_eq!(field_text(&o, "arr"), None);
        assert_eq!(field_text(&o, "missing"), None);
    }

    #[test]
    fn test_field_confidence_clamps() {
        let o = object(json!({"hi": 3.5, "lo": -1, "s": "0.4", "bad": "high", "ok": 0.75}));
        assert_eq!(field_confidence(&o, "hi", 0.8), 1.0);
        assert_eq!(field_confidence(&o, "lo", 0.8), 0.0);
        assert!((field_confidence(&o, "s", 0.8) - 0.4).abs() < 1e-6);
        assert_eq!(field_confidence(&o, "bad", 0.8), 0.8);
        assert_eq!(field_confidence(&o, "missing", 0.8), 0.8);
        assert!((field_confidence(&o, "ok", 0.8) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_field_list_and_strings() {
        let o = object(json!({"items": [1, "two", null, " ", {"x": 1}], "notalist": "x"}));
        assert_eq!(field_list(&o, "items").len(), 5);
        assert!(field_list(&o, "notalist").is_empty());
        assert_eq!(field_strings(&o, "items"), vec!["1", "two"]);
    }

    #[test]
    fn test_field_bool() {
        let o = object(json!({"t": true, "s": "no", "n": 0, "junk": "maybe"}));
        assert!(field_bool(&o, "t", false));
        assert!(!field_bool(&o, "s", true));
        assert!(!field_bool(&o, "n", true));
        assert!(field_bool(&o, "junk", true));
        assert!(field_bool(&o, "missing", true));
    }
}
