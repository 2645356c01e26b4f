use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::intelligence::canonical::normalize_identifier;

const DEFAULT_LLM_MODEL: &str = "ollama/qwen2.5:7b-instruct";

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: Option<LlmConfig>,
    pub memory: MemoryConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub auth_token: Option<String>,
    pub local_path: Option<String>,
}

/// LLM configuration for chat/completion models
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Which structuring pass turns curated candidates into graph relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructurerStrategy {
    /// Restructure candidates into relations only.
    Flat,
    /// Additionally reify events, tasks and programs into synthetic entities.
    Reifying,
}

impl std::fmt::Display for StructurerStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flat => write!(f, "flat"),
            Self::Reifying => write!(f, "reifying"),
        }
    }
}

impl std::str::FromStr for StructurerStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "flat" => Ok(Self::Flat),
            "reifying" | "reify" | "entity" => Ok(Self::Reifying),
            other => Err(format!("unknown structurer strategy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    pub structurer: StructurerStrategy,
    pub user_profile_path: PathBuf,
    pub default_user_id: String,
    pub qa_max_records: usize,
    pub recent_facts_limit: usize,
    pub chat_history_turns: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    pub show_curator: bool,
    pub show_enricher: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "file:sentinel.db".to_string()),
                auth_token: env::var("DATABASE_AUTH_TOKEN").ok(),
                local_path: env::var("DATABASE_LOCAL_PATH").ok(),
            },
            llm: {
                // An explicitly empty LLM_MODEL runs the shell without a model.
                let model = env::var("LLM_MODEL")
                    .unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string())
                    .trim()
                    .to_string();

                if model.is_empty() {
                    None
                } else {
                    Some(LlmConfig {
                        model,
                        api_key: env::var("LLM_API_KEY").ok(),
                        base_url: env::var("LLM_BASE_URL").ok(),
                        timeout_secs: parse_env_or("LLM_TIMEOUT", 60),
                        max_retries: parse_env_or("LLM_MAX_RETRIES", 2),
                    })
                }
            },
            memory: MemoryConfig {
                structurer: parse_env_or("STRUCTURER_STRATEGY", StructurerStrategy::Reifying),
                user_profile_path: env::var("USER_PROFILE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("user_profile.json")),
                default_user_id: env::var("USER_CANONICAL_ID")
                    .unwrap_or_else(|_| "User".to_string()),
                qa_max_records: parse_env_or("QA_MAX_RECORDS", 50),
                recent_facts_limit: parse_env_or("RECENT_FACTS_LIMIT", 10),
                chat_history_turns: parse_env_or("CHAT_HISTORY_TURNS", 12),
            },
            display: DisplayConfig {
                show_curator: parse_env_or("SHOW_CURATOR", true),
                show_enricher: parse_env_or("SHOW_ENRICHER", true),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Canonical id of the tracked user, read from the profile file when present.
    pub fn user_canonical_id(&self) -> String {
        load_user_canonical_id(
            &self.memory.user_profile_path,
            &self.memory.default_user_id,
        )
    }
}

#[derive(Debug, Deserialize)]
struct UserProfileFile {
    canonical_id: Option<serde_json::Value>,
}

/// Read `canonical_id` from a user profile JSON file.
///
/// A missing file, unreadable JSON or an empty id all fall back to `default`.
pub fn load_user_canonical_id(path: &Path, default: &str) -> String {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "No user profile, using default id");
            return default.to_string();
        }
    };

    let profile: UserProfileFile = match serde_json::from_str(&raw) {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Malformed user profile, using default id");
            return default.to_string();
        }
    };

    let name = match profile.canonical_id {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    if name.trim().is_empty() {
        default.to_string()
    } else {
        normalize_identifier(name.trim())
    }
}

/// Known LLM providers that use OpenAI-compatible APIs
pub const KNOWN_LLM_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio"];

/// Parse an LLM model name into (provider, model) tuple.
pub fn parse_llm_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_LLM_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    // Default to treating the whole string as a local model
    ("local", model)
}
