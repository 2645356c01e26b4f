use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{parse_llm_provider_model, LlmConfig};
use crate::error::{Result, SentinelError};
use crate::llm::api::{default_base_url, LlmApiClient};

/// The language-model text service as the memory pipeline sees it:
/// a system prompt and a user prompt in, text out.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: Option<&CompletionOptions>,
    ) -> Result<String>;

    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAI,
    OpenRouter,
    Ollama,
    LmStudio,
    OpenAICompatible { base_url: String },
    Unavailable { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub stop: Option<Vec<String>>,
}

impl CompletionOptions {
    fn with(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
            ..Default::default()
        }
    }

    /// Conversational replies, conflict explanations and memory answers.
    pub fn chat() -> Self {
        Self::with(0.6, 2048)
    }

    /// Candidate filtering must stay close to deterministic.
    pub fn curator() -> Self {
        Self::with(0.05, 900)
    }

    pub fn structurer() -> Self {
        Self::with(0.15, 1200)
    }
}

#[derive(Debug, Clone)]
pub struct LlmProvider {
    backend: LlmBackend,
    config: Option<Arc<LlmConfig>>,
}

impl LlmProvider {
    pub fn new(config: Option<&LlmConfig>) -> Self {
        let Some(config) = config else {
            return Self::unavailable("No LLM configuration provided");
        };

        let (provider, _model) = parse_llm_provider_model(&config.model);

        let backend = match provider.to_lowercase().as_str() {
            "openai" => LlmBackend::OpenAI,
            "openrouter" => LlmBackend::OpenRouter,
            "ollama" => LlmBackend::Ollama,
            "lmstudio" => LlmBackend::LmStudio,
            _ => {
                if let Some(base_url) = &config.base_url {
                    LlmBackend::OpenAICompatible {
                        base_url: base_url.clone(),
                    }
                } else {
                    LlmBackend::Unavailable {
                        reason: format!("Unknown provider in model: {}", config.model),
                    }
                }
            }
        };

        Self {
            backend,
            config: Some(Arc::new(config.clone())),
        }
    }

    pub fn unavailable(reason: &str) -> Self {
        Self {
            backend: LlmBackend::Unavailable {
                reason: reason.to_string(),
            },
            config: None,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self.backend, LlmBackend::Unavailable { .. })
    }

    pub fn backend(&self) -> &LlmBackend {
        &self.backend
    }

    pub fn config(&self) -> Option<&LlmConfig> {
        self.config.as_deref()
    }

    /// Effective API base URL, if the provider is usable.
    pub fn base_url(&self) -> Option<&str> {
        let config = self.config()?;
        if !self.is_available() {
            return None;
        }
        match &config.base_url {
            Some(url) => Some(url.as_str()),
            None => {
                let (provider, _) = parse_llm_provider_model(&config.model);
                Some(default_base_url(provider))
            }
        }
    }

    fn unavailable_reason(&self) -> String {
        match &self.backend {
            LlmBackend::Unavailable { reason } => reason.clone(),
            _ => "LLM completion is not available".to_string(),
        }
    }
}

#[async_trait]
impl TextCompletion for LlmProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: Option<&CompletionOptions>,
    ) -> Result<String> {
        if !LlmProvider::is_available(self) {
            return Err(SentinelError::LlmUnavailable(self.unavailable_reason()));
        }

        let config = self
            .config()
            .ok_or_else(|| SentinelError::LlmUnavailable("No config available".to_string()))?;

        let client = LlmApiClient::new(config)?;
        client.complete(user_prompt, Some(system_prompt), options).await
    }

    fn is_available(&self) -> bool {
        LlmProvider::is_available(self)
    }
}
