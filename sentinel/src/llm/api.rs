use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::{ApiError, OpenAIError},
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse, Stop,
    },
    Client,
};
use reqwest::StatusCode;

use crate::{
    config::{parse_llm_provider_model, LlmConfig},
    error::{Result, SentinelError},
    llm::provider::CompletionOptions,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
const LMSTUDIO_BASE_URL: &str = "http://localhost:1234/v1";

#[derive(Debug, Clone)]
struct ApiConfig {
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
    max_retries: u32,
}

/// OpenAI-compatible chat client with a per-call timeout and bounded retries.
#[derive(Clone)]
pub struct LlmApiClient {
    client: Client<OpenAIConfig>,
    config: ApiConfig,
}

impl LlmApiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_config = ApiConfig::from_llm_config(config);

        let (provider, _) = parse_llm_provider_model(&config.model);
        let needs_api_key = !matches!(
            provider.to_lowercase().as_str(),
            "ollama" | "local" | "lmstudio"
        );

        if needs_api_key && api_config.api_key.is_none() {
            return Err(SentinelError::Llm(
                "API key required for this provider".to_string(),
            ));
        }

        let openai_config = OpenAIConfig::new()
            .with_api_base(api_config.base_url.clone())
            .with_api_key(api_config.api_key.clone().unwrap_or_default());

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(api_config.timeout_secs))
            .build()
            .map_err(|error| {
                SentinelError::Llm(format!("Failed to create LLM HTTP client: {error}"))
            })?;

        // async-openai retries server errors on its own; cap that at the call timeout
        // so one turn never blocks longer than configured.
        let backoff = backoff::ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(api_config.timeout_secs)),
            ..Default::default()
        };

        let client = Client::with_config(openai_config)
            .with_http_client(http_client)
            .with_backoff(backoff);

        Ok(Self {
            client,
            config: api_config,
        })
    }

    /// Send one chat completion. Server errors and transport failures are
    /// retried with exponential delay; rate limits and auth failures are not.
    pub async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: Option<&CompletionOptions>,
    ) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(SentinelError::Validation(
                "Prompt cannot be empty".to_string(),
            ));
        }

        let request = self.build_request(prompt, system_prompt, options)?;
        let mut attempt = 0;

        loop {
            let error = match self.client.chat().create(request.clone()).await {
                Ok(response) => {
                    let content = Self::extract_content(response)?;
                    tracing::debug!(
                        response_len = content.len(),
                        attempt,
                        "LLM completion received"
                    );
                    return Ok(content);
                }
                Err(error) => error,
            };

            match Failure::classify(error) {
                Failure::Retryable(error) if attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = Duration::from_millis(100 * 2_u64.pow(attempt - 1));
                    tracing::warn!(attempt, error = %error, delay_ms = delay.as_millis() as u64, "Retrying LLM completion");
                    tokio::time::sleep(delay).await;
                }
                failure => return Err(failure.into_error()),
            }
        }
    }

    fn build_request(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: Option<&CompletionOptions>,
    ) -> Result<CreateChatCompletionRequest> {
        let invalid = |what: &str, error: OpenAIError| {
            SentinelError::Validation(format!("Invalid {what}: {error}"))
        };

        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(2);
        if let Some(system_prompt) = system_prompt.filter(|value| !value.trim().is_empty()) {
            let message = ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()
                .map_err(|error| invalid("system prompt", error))?;
            messages.push(message.into());
        }
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|error| invalid("user prompt", error))?;
        messages.push(message.into());

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(self.config.model.clone()).messages(messages);

        if let Some(options) = options {
            if let Some(temperature) = options.temperature {
                request.temperature(temperature);
            }
            if let Some(max_tokens) = options.max_tokens {
                request.max_tokens(max_tokens);
            }
            if let Some(top_p) = options.top_p {
                request.top_p(top_p);
            }
            if let Some(stop) = options.stop.as_ref().filter(|values| !values.is_empty()) {
                request.stop(Stop::StringArray(stop.clone()));
            }
        }

        request
            .build()
            .map_err(|error| invalid("LLM completion request", error))
    }

    fn extract_content(response: CreateChatCompletionResponse) -> Result<String> {
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(SentinelError::Llm(
                "LLM response contained no content".to_string(),
            ));
        }
        Ok(content)
    }
}

/// How a failed completion should be handled.
#[derive(Debug)]
enum Failure {
    RateLimited,
    Unauthorized(String),
    Retryable(SentinelError),
    Fatal(SentinelError),
}

impl Failure {
    fn classify(error: OpenAIError) -> Self {
        match error {
            OpenAIError::Reqwest(error) => match error.status() {
                Some(status) if status == StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
                Some(status) if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
                    Self::Unauthorized(error.to_string())
                }
                Some(status) if !status.is_server_error() => {
                    Self::Fatal(SentinelError::Llm(format!("LLM request failed: {error}")))
                }
                // Server errors and connection failures without a status.
                _ => Self::Retryable(SentinelError::Llm(format!("LLM request failed: {error}"))),
            },
            OpenAIError::ApiError(error) => match ApiErrorKind::of(&error) {
                ApiErrorKind::RateLimit => Self::RateLimited,
                ApiErrorKind::Auth => Self::Unauthorized(error.to_string()),
                ApiErrorKind::Untyped => {
                    Self::Retryable(SentinelError::Llm(format!("LLM API error: {error}")))
                }
                ApiErrorKind::Other => {
                    Self::Fatal(SentinelError::Llm(format!("LLM API error: {error}")))
                }
            },
            OpenAIError::JSONDeserialize(error) => {
                Self::Fatal(SentinelError::Llm(format!("Failed to parse LLM response: {error}")))
            }
            OpenAIError::InvalidArgument(message) => Self::Fatal(SentinelError::Validation(message)),
            other => Self::Fatal(SentinelError::Llm(other.to_string())),
        }
    }

    fn into_error(self) -> SentinelError {
        match self {
            Self::RateLimited => SentinelError::LlmRateLimit { retry_after: None },
            Self::Unauthorized(detail) => {
                SentinelError::Llm(format!("LLM authentication failed: {detail}"))
            }
            Self::Retryable(error) | Self::Fatal(error) => error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApiErrorKind {
    RateLimit,
    Auth,
    /// No type or code; typically a proxied server error.
    Untyped,
    Other,
}

impl ApiErrorKind {
    fn of(error: &ApiError) -> Self {
        let message = error.message.to_lowercase();
        let error_type = error.r#type.as_deref().unwrap_or_default().to_lowercase();
        let code = error.code.as_deref().unwrap_or_default().to_lowercase();
        let mentions = |needle: &str| {
            message.contains(needle) || error_type.contains(needle) || code.contains(needle)
        };

        if mentions("rate limit")
            || mentions("rate_limit")
            || message.contains("too many requests")
            || code == "insufficient_quota"
        {
            Self::RateLimit
        } else if mentions("authentication")
            || message.contains("unauthorized")
            || message.contains("forbidden")
            || message.contains("invalid api key")
            || code.contains("invalid_api_key")
        {
            Self::Auth
        } else if error.r#type.is_none() && error.code.is_none() {
            Self::Untyped
        } else {
            Self::Other
        }
    }
}

impl ApiConfig {
    fn from_llm_config(config: &LlmConfig) -> Self {
        let (provider, model) = parse_llm_provider_model(&config.model);

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(provider).to_string());

        let normalized_model = if provider.eq_ignore_ascii_case("local") {
            config.model.clone()
        } else {
            model.to_string()
        };

        Self {
            base_url,
            api_key: config.api_key.clone(),
            model: normalized_model,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        }
    }
}

pub(crate) fn default_base_url(provider: &str) -> &'static str {
    match provider.to_lowercase().as_str() {
        "openai" => OPENAI_BASE_URL,
        "openrouter" => OPENROUTER_BASE_URL,
        "ollama" => OLLAMA_BASE_URL,
        "lmstudio" => LMSTUDIO_BASE_URL,
        _ => OPENAI_BASE_URL,
    }
}
