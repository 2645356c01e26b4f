use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::StructurerStrategy;
use crate::intelligence::curator::DEFAULT_CONFIDENCE;
use crate::intelligence::response::{
    field_bool, field_confidence, field_list, field_strings, field_text, ModelReply,
};
use crate::llm::{prompts, CompletionOptions, TextCompletion};
use crate::models::{CandidateFact, StructuredRelation, SyntheticEntity};

const INVALID_JSON_NOTE: &str = "Invalid JSON from Enricher.";
const UNAVAILABLE_NOTE: &str = "Enricher model unavailable; kept candidates flat.";
const DEFAULT_ENTITY_TYPE: &str = "ENTITY";

/// Entity-centric restructuring of one turn's candidates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredOutput {
    pub entities: Vec<SyntheticEntity>,
    pub relations: Vec<StructuredRelation>,
    pub notes: Vec<String>,
}

impl StructuredOutput {
    fn empty_with_note(note: &str) -> Self {
        Self {
            notes: vec![note.to_string()],
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

/// Restructures flat candidates into graph form.
///
/// The `flat` strategy asks for relations only and ignores any entities the
/// model emits anyway; `reifying` lets the model introduce event, task and
/// program nodes referenced by key from relations.
#[derive(Clone)]
pub struct Structurer {
    llm: Arc<dyn TextCompletion>,
    strategy: StructurerStrategy,
}

impl Structurer {
    pub fn new(llm: Arc<dyn TextCompletion>, strategy: StructurerStrategy) -> Self {
        Self { llm, strategy }
    }

    pub fn strategy(&self) -> StructurerStrategy {
        self.strategy
    }

    pub async fn run(&self, clean_text: &str, candidates: &[CandidateFact]) -> StructuredOutput {
        if candidates.is_empty() {
            return StructuredOutput::default();
        }

        if !self.llm.is_available() {
            tracing::warn!("LLM unavailable, skipping structurer");
            return StructuredOutput::empty_with_note(UNAVAILABLE_NOTE);
        }

        let system_prompt = prompts::structurer_system_prompt(self.strategy);
        let prompt = prompts::structurer_prompt(clean_text, candidates);
        let options = CompletionOptions::structurer();

        match self
            .llm
            .complete(&system_prompt, &prompt, Some(&options))
            .await
        {
            Ok(raw) => parse_structurer_reply(&raw, self.strategy),
            Err(error) => {
                tracing::warn!(error = %error, strategy = %self.strategy, "Structurer completion failed");
                StructuredOutput::empty_with_note(INVALID_JSON_NOTE)
            }
        }
    }
}

/// Decode a structurer reply under the given strategy.
pub fn parse_structurer_reply(raw: &str, strategy: StructurerStrategy) -> StructuredOutput {
    match ModelReply::decode(raw, |object| structured_output_from(object, strategy)) {
        ModelReply::Parsed(output) => {
            tracing::debug!(
                entities = output.entities.len(),
                relations = output.relations.len(),
                %strategy,
                "Structurer reply parsed"
            );
            output
        }
        ModelReply::Invalid { reason } => {
            tracing::warn!(%reason, "Structurer reply rejected");
            StructuredOutput::empty_with_note(INVALID_JSON_NOTE)
        }
    }
}

fn structured_output_from(
    object: &Map<String, Value>,
    strategy: StructurerStrategy,
) -> StructuredOutput {
    let entities = match strategy {
        StructurerStrategy::Flat => Vec::new(),
        StructurerStrategy::Reifying => field_list(object, "entities")
            .iter()
            .filter_map(Value::as_object)
            .filter_map(entity_from)
            .collect(),
    };

    let relations = field_list(object, "relations")
        .iter()
        .filter_map(Value::as_object)
        .filter_map(relation_from)
        .collect();

    StructuredOutput {
        entities,
        relations,
        notes: field_strings(object, "notes"),
    }
}

fn entity_from(object: &Map<String, Value>) -> Option<SyntheticEntity> {
    let key = field_text(object, "key")?;
    let label = field_text(object, "label")?;

    Some(SyntheticEntity {
        key,
        entity_type: field_text(object, "type").unwrap_or_else(|| DEFAULT_ENTITY_TYPE.to_string()),
        label,
        time_text: field_text(object, "time_text"),
    })
}

fn relation_from(object: &Map<String, Value>) -> Option<StructuredRelation> {
    Some(StructuredRelation {
        subject: field_text(object, "subj")?,
        relation: field_text(object, "rel")?,
        object: field_text(object, "obj")?,
        confidence: field_confidence(object, "confidence", DEFAULT_CONFIDENCE),
        derived: field_bool(object, "derived", true),
    })
}
