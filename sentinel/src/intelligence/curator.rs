use std::sync::Arc;

use serde_json::{Map, Value};

use crate::intelligence::response::{
    field_confidence, field_list, field_strings, field_text, value_text, ModelReply,
};
use crate::llm::{prompts, CompletionOptions, TextCompletion};
use crate::models::CandidateFact;

pub const DEFAULT_CONFIDENCE: f32 = 0.8;

const DEFAULT_SUBJECT: &str = "USER";
const DEFAULT_RELATION: &str = "FACT";
const INVALID_JSON_NOTE: &str = "Curator output was not valid JSON; stored nothing.";
const UNAVAILABLE_NOTE: &str = "Curator model unavailable; stored nothing.";

/// What the curator kept from one utterance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CuratorResult {
    pub clean_text: String,
    pub candidates: Vec<CandidateFact>,
    pub notes: Vec<String>,
}

impl CuratorResult {
    fn empty_with_note(note: &str) -> Self {
        Self {
            notes: vec![note.to_string()],
            ..Self::default()
        }
    }

    pub fn has_candidates(&self) -> bool {
        !self.candidates.is_empty()
    }
}

/// Candidate filter: reduces an utterance to literal, durable candidate facts.
#[derive(Clone)]
pub struct Curator {
    llm: Arc<dyn TextCompletion>,
}

impl Curator {
    pub fn new(llm: Arc<dyn TextCompletion>) -> Self {
        Self { llm }
    }

    /// Never fails: model errors and unusable replies yield an empty result
    /// carrying a note.
    pub async fn run(&self, utterance: &str) -> CuratorResult {
        if utterance.trim().is_empty() {
            return CuratorResult::default();
        }

        if !self.llm.is_available() {
            tracing::warn!("LLM unavailable, skipping curator");
            return CuratorResult::empty_with_note(UNAVAILABLE_NOTE);
        }

        let prompt = prompts::curator_prompt(utterance);
        let options = CompletionOptions::curator();
        let raw = match self
            .llm
            .complete(prompts::CURATOR_SYSTEM_PROMPT, &prompt, Some(&options))
            .await
        {
            Ok(raw) => raw,
            Err(error) => {
                tracing::warn!(error = %error, "Curator completion failed");
                return CuratorResult::empty_with_note(INVALID_JSON_NOTE);
            }
        };

        parse_curator_reply(&raw)
    }
}

/// Decode a curator reply, filling defaults field by field.
pub fn parse_curator_reply(raw: &str) -> CuratorResult {
    match ModelReply::decode(raw, curator_result_from) {
        ModelReply::Parsed(result) => {
            tracing::debug!(
                candidates = result.candidates.len(),
                notes = result.notes.len(),
                "Curator reply parsed"
            );
            result
        }
        ModelReply::Invalid { reason } => {
            tracing::warn!(%reason, "Curator reply rejected");
            CuratorResult::empty_with_note(INVALID_JSON_NOTE)
        }
    }
}

fn curator_result_from(object: &Map<String, Value>) -> CuratorResult {
    let candidates = field_list(object, "candidates")
        .iter()
        .filter_map(Value::as_object)
        .filter_map(candidate_from)
        .collect();

    CuratorResult {
        clean_text: field_text(object, "clean_text").unwrap_or_default(),
        candidates,
        notes: field_strings(object, "notes"),
    }
}

fn candidate_from(object: &Map<String, Value>) -> Option<CandidateFact> {
    let subject = field_text(object, "subj").unwrap_or_else(|| DEFAULT_SUBJECT.to_string());

    // A missing relation means "some fact"; a present but blank one is noise.
    let relation = match object.get("rel") {
        None | Some(Value::Null) => DEFAULT_RELATION.to_string(),
        Some(value) => value_text(value)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())?,
    };
    let object_text = field_text(object, "obj")?;

    Some(CandidateFact {
        subject,
        relation,
        object: object_text,
        confidence: field_confidence(object, "confidence", DEFAULT_CONFIDENCE),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SentinelError};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct Canned(std::result::Result<String, String>);

    #[async_trait]
    impl TextCompletion for Canned {
        async fn complete(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _options: Option<&CompletionOptions>,
        ) -> Result<String> {
            self.0.clone().map_err(SentinelError::Llm)
        }
    }

    fn curator(reply: std::result::Result<&str, &str>) -> Curator {
        let reply = reply.map(str::to_string).map_err(str::to_string);
        Curator::new(Arc::new(Canned(reply)))
    }

    #[test]
    fn test_parse_full_reply() {
        let raw = r#"{
            "clean_text": "User lives in Melbourne, Australia.",
            "candidates": [
                {"subj": "USER", "rel": "LIVES_IN", "obj": "Melbourne, Australia", "confidence": 0.9}
            ],
            "notes": ["Removed greeting."]
        }"#;
        let result = parse_curator_reply(raw);

        assert_eq!(result.clean_text, "User lives in Melbourne, Australia.");
        assert_eq!(
            result.candidates,
            vec![CandidateFact {
                subject: "USER".to_string(),
                relation: "LIVES_IN".to_string(),
                object: "Melbourne, Australia".to_string(),
                confidence: 0.9,
            }]
        );
        assert_eq!(result.notes, vec!["Removed greeting."]);
    }

    #[test]
    fn test_parse_fills_defaults_and_drops_incomplete() {
        let raw = r#"Here is the JSON: {
            "candidates": [
                {"obj": "Paul"},
                {"subj": "USER", "rel": "  ", "obj": "x"},
                {"subj": "USER", "rel": "AGE"},
                {"subj": "", "rel": "AGE", "obj": 24, "confidence": 7},
                "not a record",
                {"rel": "FROM", "obj": "Vietnam", "confidence": "low"}
            ],
            "notes": ["", "kept age", null]
        }"#;
        let result = parse_curator_reply(raw);

        assert_eq!(result.clean_text, "");
        let rendered: Vec<(String, String, String, f32)> = result
            .candidates
            .iter()
            .map(|c| {
                (
                    c.subject.clone(),
                    c.relation.clone(),
                    c.object.clone(),
                    c.confidence,
                )
            })
            .collect();
        assert_eq!(
            rendered,
            vec![
                ("USER".to_string(), "FACT".to_string(), "Paul".to_string(), 0.8),
                ("USER".to_string(), "AGE".to_string(), "24".to_string(), 1.0),
                ("USER".to_string(), "FROM".to_string(), "Vietnam".to_string(), 0.8),
            ]
        );
        assert_eq!(result.notes, vec!["kept age"]);
    }

    #[test]
    fn test_parse_wrong_shapes_default() {
        let result = parse_curator_reply(r#"{"candidates": "none", "notes": "n/a"}"#);
        assert!(result.candidates.is_empty());
        assert!(result.notes.is_empty());
    }

    #[test]
    fn test_parse_non_json_yields_note() {
        let result = parse_curator_reply("I could not find anything.");
        assert!(!result.has_candidates());
        assert_eq!(result.notes, vec![INVALID_JSON_NOTE]);
    }

    #[tokio::test]
    async fn test_run_recovers_from_llm_error() {
        let result = curator(Err("connection refused")).run("I live in Sydney").await;
        assert!(!result.has_candidates());
        assert_eq!(result.notes.len(), 1);
    }

    #[tokio::test]
    async fn test_run_parses_reply() {
        let result = curator(Ok(
            r#"{"clean_text": "User is 24.", "candidates": [{"subj": "USER", "rel": "AGE", "obj": "24"}], "notes": []}"#,
        ))
        .run("I'm 24")
        .await;
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].relation, "AGE");
    }

    #[tokio::test]
    async fn test_run_skips_blank_utterance() {
        let result = curator(Ok("{}")).run("   ").await;
        assert_eq!(result, CuratorResult::default());
    }
}
