#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use sentinel::config::{DatabaseConfig, DisplayConfig};
use sentinel::db::{Database, FactStore, LibSqlBackend};
use sentinel::error::{Result, SentinelError};
use sentinel::llm::{prompts, CompletionOptions, TextCompletion};
use sentinel::services::Session;

/// Which pipeline stage a completion request came from, judged by its
/// system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Curator,
    Structurer,
    Conflict,
    Qa,
    Chat,
}

impl Role {
    fn of(system_prompt: &str) -> Self {
        if system_prompt == prompts::CURATOR_SYSTEM_PROMPT {
            Role::Curator
        } else if system_prompt == prompts::CONFLICT_SYSTEM_PROMPT {
            Role::Conflict
        } else if system_prompt == prompts::MEMORY_QA_SYSTEM_PROMPT {
            Role::Qa
        } else if system_prompt == prompts::CHAT_SYSTEM_PROMPT {
            Role::Chat
        } else {
            Role::Structurer
        }
    }
}

/// In-process language model answering from per-role queues. An exhausted
/// queue behaves like a provider error.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<Vec<(Role, VecDeque<String>)>>,
    calls: Mutex<Vec<(Role, String)>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, role: Role, text: &str) -> Self {
        {
            let mut replies = self.replies.lock().unwrap();
            match replies.iter_mut().find(|(r, _)| *r == role) {
                Some((_, queue)) => queue.push_back(text.to_string()),
                None => replies.push((role, VecDeque::from([text.to_string()]))),
            }
        }
        self
    }

    /// One curator reply plus one structurer reply.
    pub fn turn(self, curator: &str, structurer: &str) -> Self {
        self.reply(Role::Curator, curator)
            .reply(Role::Structurer, structurer)
    }

    /// User prompts sent for `role`, in order.
    pub fn prompts_for(&self, role: Role) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }
}

#[async_trait]
impl TextCompletion for ScriptedLlm {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        _options: Option<&CompletionOptions>,
    ) -> Result<String> {
        let role = Role::of(system_prompt);
        self.calls
            .lock()
            .unwrap()
            .push((role, user_prompt.to_string()));

        let mut replies = self.replies.lock().unwrap();
        replies
            .iter_mut()
            .find(|(r, _)| *r == role)
            .and_then(|(_, queue)| queue.pop_front())
            .ok_or_else(|| SentinelError::Llm(format!("no scripted reply for {role:?}")))
    }
}

pub fn database_config(url: &str) -> DatabaseConfig {
    DatabaseConfig {
        url: url.to_string(),
        auth_token: None,
        local_path: None,
    }
}

pub async fn memory_store() -> Arc<dyn FactStore> {
    let db = Database::new(&database_config(":memory:"))
        .await
        .expect("in-memory database");
    Arc::new(LibSqlBackend::new(db))
}

pub async fn file_store(dir: &Path) -> Arc<dyn FactStore> {
    let url = format!("file:{}", dir.join("facts.db").display());
    let db = Database::new(&database_config(&url))
        .await
        .expect("file database");
    Arc::new(LibSqlBackend::new(db))
}

pub fn session() -> Session {
    Session::new(
        &DisplayConfig {
            show_curator: false,
            show_enricher: false,
        },
        6,
    )
}

pub fn curator_json(candidates: &[(&str, &str, &str)]) -> String {
    let candidates: Vec<serde_json::Value> = candidates
        .iter()
        .map(|(s, r, o)| serde_json::json!({"subj": s, "rel": r, "obj": o, "confidence": 0.9}))
        .collect();
    serde_json::json!({
        "clean_text": "cleaned",
        "candidates": candidates,
        "notes": [],
    })
    .to_string()
}

pub fn relations_json(relations: &[(&str, &str, &str)]) -> String {
    let relations: Vec<serde_json::Value> = relations
        .iter()
        .map(|(s, r, o)| serde_json::json!({"subj": s, "rel": r, "obj": o, "confidence": 0.9, "derived": true}))
        .collect();
    serde_json::json!({
        "entities": [],
        "relations": relations,
        "notes": [],
    })
    .to_string()
}
