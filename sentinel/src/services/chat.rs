use std::sync::Arc;

use crate::llm::{prompts, CompletionOptions, TextCompletion};
use crate::services::session::Session;

pub const CHAT_APOLOGY: &str =
    "Sorry, I could not come up with a reply just now, but I am still listening.";

/// Conversational replies. Independent of the memory pipeline, so the user
/// always gets an answer even when extraction fails.
#[derive(Clone)]
pub struct ChatAgent {
    llm: Arc<dyn TextCompletion>,
}

impl ChatAgent {
    pub fn new(llm: Arc<dyn TextCompletion>) -> Self {
        Self { llm }
    }

    pub async fn reply(&self, session: &Session, utterance: &str) -> String {
        if !self.llm.is_available() {
            return CHAT_APOLOGY.to_string();
        }

        let history: Vec<(&str, &str)> = session
            .history()
            .map(|turn| (turn.role.as_str(), turn.content.as_str()))
            .collect();
        let prompt = prompts::chat_prompt(&history, utterance);
        let options = CompletionOptions::chat();

        match self
            .llm
            .complete(prompts::CHAT_SYSTEM_PROMPT, &prompt, Some(&options))
            .await
        {
            Ok(reply) => reply.trim().to_string(),
            Err(error) => {
                tracing::warn!(error = %error, "Chat completion failed");
                CHAT_APOLOGY.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DisplayConfig;
    use crate::error::{Result, SentinelError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl TextCompletion for Recording {
        async fn complete(
            &self,
            _system_prompt: &str,
            user_prompt: &str,
            _options: Option<&CompletionOptions>,
        ) -> Result<String> {
            self.prompts.lock().unwrap().push(user_prompt.to_string());
            if self.fail {
                Err(SentinelError::Llm("boom".to_string()))
            } else {
                Ok("  Nice to meet you!  ".to_string())
            }
        }
    }

    fn session() -> Session {
        Session::new(
            &DisplayConfig {
                show_curator: false,
                show_enricher: false,
            },
            4,
        )
    }

    #[tokio::test]
    async fn test_reply_includes_history() {
        let llm = Arc::new(Recording::default());
        let agent = ChatAgent::new(llm.clone());
        let mut session = session();
        session.record_exchange("I'm Paul", "Hi Paul!");

        let reply = agent.reply(&session, "I live in Melbourne").await;
        assert_eq!(reply, "Nice to meet you!");

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains("User: I'm Paul"));
        assert!(prompts[0].contains("Assistant: Hi Paul!"));
        assert!(prompts[0].ends_with("User: I live in Melbourne"));
    }

    #[tokio::test]
    async fn test_reply_apologizes_on_failure() {
        let agent = ChatAgent::new(Arc::new(Recording {
            fail: true,
            ..Default::default()
        }));
        assert_eq!(agent.reply(&session(), "hello").await, CHAT_APOLOGY);
    }
}
