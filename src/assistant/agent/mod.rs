//! SQL agent: completion backends, tools and the tool loop.

pub mod azure;
pub mod backend;
pub mod events;
pub mod invoker;
pub mod ollama;
pub mod tools;

use std::sync::Arc;

pub use azure::AzureOpenAiBackend;
pub use backend::{
    BackendFuture, CompletionBackend, ModelReply, StepRequest, ToolCallRequest, ToolExchange,
    ToolRound, ToolSpec,
};
pub use events::{
    EventSink, ReplyStream, ThinkingStep, TurnEvent, fold_fragments, fragments,
    normalize_line_endings,
};
pub use invoker::{AgentInvoker, AgentResponse, ToolTrace};
pub use ollama::OllamaRigBackend;
pub use tools::{SqlToolkit, ToolObservation};

use crate::assistant::core::config::{LlmConfig, LlmProvider};
use crate::assistant::core::errors::ConfigError;

/// Build the configured completion backend.
///
/// # Errors
/// Returns an error if the provider settings are incomplete.
pub fn build_backend(config: &LlmConfig) -> Result<Arc<dyn CompletionBackend>, ConfigError> {
    Ok(match config.provider {
        LlmProvider::Azure => Arc::new(AzureOpenAiBackend::new(config)?),
        LlmProvider::Ollama => Arc::new(OllamaRigBackend::new(config)?),
    })
}
