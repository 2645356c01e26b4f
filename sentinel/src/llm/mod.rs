mod api;
pub mod prompts;
mod provider;

pub use api::LlmApiClient;
pub use provider::{CompletionOptions, LlmBackend, LlmProvider, TextCompletion};
