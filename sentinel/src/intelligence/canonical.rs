//! Canonical identifiers and relation labels.
//!
//! Everything here is pure and total: identical input always yields the
//! identical output, which is what lets dedup and conflict matching work
//! across turns.

use std::sync::OnceLock;

use regex::Regex;

/// Maximum length of a node identifier.
pub const MAX_IDENTIFIER_LEN: usize = 60;

/// Relation label used when a label normalizes to nothing.
pub const DEFAULT_RELATION: &str = "RELATED_TO";

const DEFAULT_IDENTIFIER: &str = "node";

const GARBAGE_NODES: &[&str] = &[
    "OBJECT",
    "THING",
    "SOMETHING",
    "SOMEONE",
    "UNKNOWN",
    "NONE",
    "NULL",
    "NODE",
    "ITEM",
];

const USER_REFERENCES: &[&str] = &[
    "i",
    "me",
    "my",
    "myself",
    "user",
    "the user",
    "speaker",
    "the speaker",
];

fn camel_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-z0-9])([A-Z])").expect("static regex"))
}

/// Replace every non-alphanumeric character with `_` and collapse runs.
fn snake_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let mapped = if c.is_ascii_alphanumeric() { c } else { '_' };
        if mapped == '_' && out.ends_with('_') {
            continue;
        }
        out.push(mapped);
    }
    out
}

/// Turn an arbitrary surface string into a stable node identifier.
///
/// The result is ASCII alphanumeric/underscore only, at most
/// [`MAX_IDENTIFIER_LEN`] characters, never empty and never digit-leading.
/// Case is preserved.
pub fn normalize_identifier(text: &str) -> String {
    let mut out = snake_ascii(text);

    if out.trim_matches('_').is_empty() {
        return DEFAULT_IDENTIFIER.to_string();
    }

    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert_str(0, "id_");
    }

    out.truncate(MAX_IDENTIFIER_LEN);
    out
}

/// Canonicalize a relation type into UPPER_SNAKE_CASE.
///
/// `StudiesIn` and `studies in` both become `STUDIES_IN`.
pub fn normalize_relation(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return DEFAULT_RELATION.to_string();
    }

    let split = camel_boundary().replace_all(trimmed, "${1}_${2}");
    let label = snake_ascii(&split).to_uppercase();
    let label = label.trim_matches('_');

    if label.is_empty() {
        DEFAULT_RELATION.to_string()
    } else {
        label.to_string()
    }
}

/// Lowercase and collapse punctuation/whitespace for matching only.
fn surface_key(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether an extracted mention refers to the human user.
pub fn is_user_reference(surface: &str) -> bool {
    let key = surface_key(surface);
    USER_REFERENCES.contains(&key.as_str())
}

/// Placeholder objects that carry no information and are never stored.
pub fn is_garbage_node(candidate: &str) -> bool {
    let upper = candidate.trim().to_uppercase();
    upper.is_empty() || GARBAGE_NODES.contains(&upper.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_identifier_shape(id: &str) {
        assert!(!id.is_empty());
        assert!(id.len() <= MAX_IDENTIFIER_LEN, "too long: {id}");
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        assert!(!id.starts_with(|c: char| c.is_ascii_digit()));
    }

    #[test]
    fn test_normalize_identifier_basic() {
        assert_eq!(normalize_identifier("Melbourne"), "Melbourne");
        assert_eq!(normalize_identifier("multi-agent systems"), "multi_agent_systems");
        assert_eq!(normalize_identifier("today  4PM"), "today_4PM");
    }

    #[test]
    fn test_normalize_identifier_defaults() {
        assert_eq!(normalize_identifier(""), "node");
        assert_eq!(normalize_identifier("!!!"), "node");
        assert_eq!(normalize_identifier("   "), "node");
    }

    #[test]
    fn test_normalize_identifier_digit_prefix() {
        assert_eq!(normalize_identifier("24"), "id_24");
        assert_eq!(normalize_identifier("4PM meeting"), "id_4PM_meeting");
    }

    #[test]
    fn test_normalize_identifier_truncates() {
        let long = "a".repeat(100);
        assert_eq!(normalize_identifier(&long).len(), MAX_IDENTIFIER_LEN);

        let digits = "9".repeat(100);
        let id = normalize_identifier(&digits);
        assert_eq!(id.len(), MAX_IDENTIFIER_LEN);
        assert!(id.starts_with("id_"));
    }

    #[test]
    fn test_normalize_identifier_properties() {
        let samples = [
            "",
            "Hello, World!",
            "  leading space",
            "123 Main St.",
            "Ho Chi Minh City",
            "naïve café",
            "___",
            "a__b",
            "日本",
            "_x_",
            &"long phrase ".repeat(20),
        ];
        for s in samples {
            let once = normalize_identifier(s);
            assert_identifier_shape(&once);
            assert_eq!(normalize_identifier(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_normalize_relation_camel_case() {
        assert_eq!(normalize_relation("StudiesIn"), "STUDIES_IN");
        assert_eq!(normalize_relation("livesIn"), "LIVES_IN");
        assert_eq!(normalize_relation("hasPhoneNumber"), "HAS_PHONE_NUMBER");
    }

    #[test]
    fn test_normalize_relation_punctuation() {
        assert_eq!(normalize_relation("lives in"), "LIVES_IN");
        assert_eq!(normalize_relation("  works--at "), "WORKS_AT");
        assert_eq!(normalize_relation("_current role_"), "CURRENT_ROLE");
    }

    #[test]
    fn test_normalize_relation_defaults() {
        assert_eq!(normalize_relation(""), DEFAULT_RELATION);
        assert_eq!(normalize_relation("---"), DEFAULT_RELATION);
    }

    #[test]
    fn test_normalize_relation_properties() {
        for r in ["LIVES_IN", "livesIn", "has phone number", "A1B", "x", "é", "Rel2Rel"] {
            let once = normalize_relation(r);
            assert!(once
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'));
            assert!(!once.starts_with('_') && !once.ends_with('_'));
            assert_eq!(normalize_relation(&once), once, "not idempotent for {r:?}");
        }
    }

    #[test]
    fn test_is_user_reference() {
        for s in ["I", "me", "My", "myself", "USER", "the user", "The  Speaker", "the_user"] {
            assert!(is_user_reference(s), "{s} should be the user");
        }
        for s in ["Paul", "users", "melbourne", "speakers corner", "", "?", " - "] {
            assert!(!is_user_reference(s), "{s} should not be the user");
        }
    }

    #[test]
    fn test_is_garbage_node() {
        assert!(is_garbage_node("OBJECT"));
        assert!(is_garbage_node(" unknown "));
        assert!(is_garbage_node("null"));
        assert!(is_garbage_node(""));
        assert!(!is_garbage_node("Melbourne"));
        assert!(!is_garbage_node("objects"));
    }
}
