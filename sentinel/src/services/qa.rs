use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::db::FactStore;
use crate::error::Result;
use crate::intelligence::temporal::{detect_time_window, select_evidence};
use crate::llm::{prompts, CompletionOptions, TextCompletion};

pub const NO_MEMORIES: &str = "I do not have any stored memories yet.";

/// Answers questions about the user from the stored fact log.
#[derive(Clone)]
pub struct MemoryQa {
    store: Arc<dyn FactStore>,
    llm: Arc<dyn TextCompletion>,
    max_records: usize,
}

impl MemoryQa {
    pub fn new(store: Arc<dyn FactStore>, llm: Arc<dyn TextCompletion>, max_records: usize) -> Self {
        Self {
            store,
            llm,
            max_records: max_records.max(1),
        }
    }

    /// Store errors propagate. When the model cannot answer, the evidence
    /// log itself is returned so the user still sees what is remembered.
    pub async fn answer(&self, question: &str, now: NaiveDateTime) -> Result<String> {
        let facts = self.store.all_facts().await?;
        if facts.is_empty() {
            return Ok(NO_MEMORIES.to_string());
        }

        let window = detect_time_window(question, now);
        if let Some(window) = &window {
            tracing::debug!(start = %window.start, end = %window.end, "Question scoped to time window");
        }
        let evidence = select_evidence(facts, window.as_ref(), self.max_records);
        let memory_log = prompts::evidence_log(&evidence);

        if !self.llm.is_available() {
            return Ok(fallback_answer(&memory_log));
        }

        let prompt = prompts::memory_qa_prompt(&memory_log, question);
        let options = CompletionOptions::chat();
        match self
            .llm
            .complete(prompts::MEMORY_QA_SYSTEM_PROMPT, &prompt, Some(&options))
            .await
        {
            Ok(answer) => Ok(answer.trim().to_string()),
            Err(error) => {
                tracing::warn!(error = %error, evidence = evidence.len(), "Memory QA completion failed");
                Ok(fallback_answer(&memory_log))
            }
        }
    }
}

fn fallback_answer(memory_log: &str) -> String {
    format!("I could not reason over my memories right now. Here is what I have stored:\n{memory_log}")
}
