//! Single-valued relation conflicts and their three-way resolution.
//!
//! A conflicting fact is always written first; the record raised here only
//! describes the decision the user still has to make about it.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::db::FactStore;
use crate::error::{Result, SentinelError};
use crate::intelligence::response::{field_list, field_text, ModelReply};
use crate::llm::{prompts, CompletionOptions, TextCompletion};
use crate::models::{ConflictRecord, Fact, FactStatus, ResolutionChoice, StoredFact};

/// Relations for which a subject has at most one currently valid object.
pub const SINGLE_VALUED_RELATIONS: &[&str] = &[
    "LIVES_IN",
    "WORKS_AT",
    "STUDIES_AT",
    "HAS_PHONE_NUMBER",
    "HAS_EMAIL",
    "HAS_BIRTHDATE",
    "CURRENT_ROLE",
    "CURRENT_JOB",
];

pub fn is_single_valued(relation: &str) -> bool {
    let relation = relation.trim().to_uppercase();
    SINGLE_VALUED_RELATIONS.contains(&relation.as_str())
}

/// Map a user reply onto a resolution choice, or `None` when the reply is
/// ordinary conversation.
pub fn interpret_choice(reply: &str) -> Option<ResolutionChoice> {
    let text = reply.trim().to_lowercase();

    if matches!(text.as_str(), "a" | "option a")
        || text.contains("outdated")
        || text.contains("new fact is correct")
    {
        return Some(ResolutionChoice::A);
    }
    if matches!(text.as_str(), "b" | "option b") || text.contains("both") {
        return Some(ResolutionChoice::B);
    }
    if matches!(text.as_str(), "c" | "option c")
        || text.contains("keep the old")
        || text.contains("wrong")
        || text.contains("incorrect")
    {
        return Some(ResolutionChoice::C);
    }

    if text.starts_with("a ") {
        Some(ResolutionChoice::A)
    } else if text.starts_with("b ") {
        Some(ResolutionChoice::B)
    } else if text.starts_with("c ") {
        Some(ResolutionChoice::C)
    } else {
        None
    }
}

/// One labeled option presented to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictOption {
    pub label: String,
    pub text: String,
}

/// Natural-language explanation of a conflict plus the A/B/C options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictExplanation {
    pub explanation: String,
    pub options: Vec<ConflictOption>,
}

impl ConflictExplanation {
    /// Deterministic explanation built from the record alone.
    pub fn fallback(record: &ConflictRecord) -> Self {
        let previous = record
            .old
            .iter()
            .map(|fact| fact.object.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            explanation: format!(
                "I already have {} -[{}]-> {}, but you just told me {} -[{}]-> {}. \
{} should only have one value at a time.",
                record.subject,
                record.relation,
                previous,
                record.subject,
                record.relation,
                record.new_object,
                record.relation
            ),
            options: default_options(),
        }
    }

    /// Text shown in the shell, ending with the A/B/C prompt.
    pub fn render(&self) -> String {
        let mut lines = vec![self.explanation.clone(), String::new()];
        lines.extend(
            self.options
                .iter()
                .map(|option| format!("  {}: {}", option.label, option.text)),
        );
        lines.push(String::new());
        lines.push("Please reply with A, B, or C.".to_string());
        lines.join("\n")
    }
}

fn default_options() -> Vec<ConflictOption> {
    ResolutionChoice::all()
        .iter()
        .map(|choice| ConflictOption {
            label: choice.label().to_string(),
            text: choice.default_text().to_string(),
        })
        .collect()
}

/// Conflict detection, explanation and resolution against a fact store.
#[derive(Clone)]
pub struct ConflictEngine {
    llm: Arc<dyn TextCompletion>,
}

impl ConflictEngine {
    pub fn new(llm: Arc<dyn TextCompletion>) -> Self {
        Self { llm }
    }

    /// Stored facts that disagree with `fact` on a single-valued relation.
    /// Must run before `fact` itself is inserted.
    pub async fn detect(&self, store: &dyn FactStore, fact: &Fact) -> Result<Vec<StoredFact>> {
        if !is_single_valued(fact.relation()) {
            return Ok(Vec::new());
        }

        let conflicts: Vec<StoredFact> = store
            .facts_for_subject(fact.subject())
            .await?
            .into_iter()
            .filter(|existing| {
                existing.relation.eq_ignore_ascii_case(fact.relation())
                    && existing.object != fact.object()
            })
            .collect();

        if !conflicts.is_empty() {
            tracing::info!(
                subject = %fact.subject(),
                relation = %fact.relation(),
                new_object = %fact.object(),
                previous = conflicts.len(),
                "Single-valued relation conflict detected"
            );
        }

        Ok(conflicts)
    }

    /// Ask the model to explain the conflict; fills in deterministic text
    /// for anything the reply lacks.
    pub async fn explain(&self, record: &ConflictRecord) -> ConflictExplanation {
        let fallback = ConflictExplanation::fallback(record);

        if !self.llm.is_available() {
            return fallback;
        }

        let prompt = prompts::conflict_prompt(record);
        let options = CompletionOptions::chat();
        let raw = match self
            .llm
            .complete(prompts::CONFLICT_SYSTEM_PROMPT, &prompt, Some(&options))
            .await
        {
            Ok(raw) => raw,
            Err(error) => {
                tracing::warn!(error = %error, "Conflict explanation failed, using fallback");
                return fallback;
            }
        };

        match ModelReply::decode(&raw, |object| explanation_from(object, &fallback)) {
            ModelReply::Parsed(explanation) => explanation,
            ModelReply::Invalid { reason } => {
                tracing::debug!(%reason, "Conflict explanation was not JSON, using fallback");
                fallback
            }
        }
    }

    /// Apply the user's decision to the store. Fails with `NotFound`, leaving
    /// the store untouched, when the new fact is no longer stored.
    pub async fn apply(
        &self,
        store: &dyn FactStore,
        choice: ResolutionChoice,
        record: &ConflictRecord,
    ) -> Result<()> {
        let new_key = record.new_key();

        let affected = match choice {
            ResolutionChoice::A | ResolutionChoice::B => {
                let affected = store.update_status(&new_key, FactStatus::Current).await?;
                if affected > 0 {
                    let old_status = if choice == ResolutionChoice::A {
                        FactStatus::Past
                    } else {
                        FactStatus::Current
                    };
                    for old in &record.old {
                        store.update_status(&old.key(), old_status).await?;
                    }
                }
                affected
            }
            ResolutionChoice::C => store.delete_fact(&new_key).await?,
        };
        if affected == 0 {
            return Err(SentinelError::NotFound(format!(
                "conflicting fact is no longer stored: {}",
                record.new_fact_line()
            )));
        }

        tracing::info!(
            subject = %record.subject,
            relation = %record.relation,
            new_object = %record.new_object,
            %choice,
            "Conflict resolved"
        );
        Ok(())
    }
}

fn explanation_from(object: &Map<String, Value>, fallback: &ConflictExplanation) -> ConflictExplanation {
    let explanation = field_text(object, "explanation").unwrap_or_else(|| fallback.explanation.clone());

    let mut options = fallback.options.clone();
    for item in field_list(object, "options").iter().filter_map(Value::as_object) {
        let (Some(label), Some(text)) = (field_text(item, "label"), field_text(item, "text")) else {
            continue;
        };
        let label = label.trim_end_matches(&[':', ')', '.'][..]).to_uppercase();
        if let Some(option) = options.iter_mut().find(|option| option.label == label) {
            option.text = text;
        }
    }

    ConflictExplanation {
        explanation,
        options,
    }
}
