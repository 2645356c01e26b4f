use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM rate limit exceeded, retry after {retry_after:?} seconds")]
    LlmRateLimit { retry_after: Option<u64> },
}

impl SentinelError {
    /// Errors raised by the language-model boundary. These are recovered
    /// locally by every pipeline stage; everything else ends the turn.
    pub fn is_llm(&self) -> bool {
        matches!(
            self,
            SentinelError::Llm(_)
                | SentinelError::LlmUnavailable(_)
                | SentinelError::LlmRateLimit { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SentinelError>;
