//! Ollama backend through `rig-core`.
//!
//! The history and the tool transcript are flattened into one text prompt;
//! tools are declared natively so the model can answer with tool calls.

use std::time::Duration;

use reqwest::Client as ReqwestClient;
use rig::client::CompletionClient;
use rig::completion::{CompletionModel, ToolDefinition};
use rig::message::AssistantContent;
use rig::providers::ollama;

use crate::assistant::core::config::LlmConfig;
use crate::assistant::core::errors::{AgentError, AgentResult, ConfigError};

use super::backend::{
    BackendFuture, CompletionBackend, ModelReply, StepRequest, ToolCallRequest, ToolRound,
};

/// Default Ollama API root.
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Completion backend served by a local or remote Ollama instance.
pub struct OllamaRigBackend {
    model: ollama::CompletionModel,
    http: ReqwestClient,
    base_url: String,
    temperature: f64,
    max_tokens: Option<u64>,
}

impl OllamaRigBackend {
    /// Build the backend from configuration.
    ///
    /// # Errors
    /// Returns an error if the rig client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, ConfigError> {
        let base_url = config
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        let client = ollama::Client::<ReqwestClient>::builder()
            .api_key(rig::client::Nothing)
            .base_url(&base_url)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("ollama client: {e}")))?;
        let model = client.completion_model(config.model.clone());

        let http = ReqwestClient::builder()
            .timeout(PING_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("ollama http client: {e}")))?;

        Ok(Self {
            model,
            http,
            base_url,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

impl CompletionBackend for OllamaRigBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn ping(&self) -> BackendFuture<'_, AgentResult<()>> {
        Box::pin(async move {
            let url = format!("{}/api/version", self.base_url.trim_end_matches('/'));
            let response = self.http.get(url).send().await?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(AgentError::Backend(format!(
                    "ollama status {}",
                    response.status().as_u16()
                )))
            }
        })
    }

    fn step<'a>(&'a self, request: StepRequest<'a>) -> BackendFuture<'a, AgentResult<ModelReply>> {
        Box::pin(async move {
            let mut text = request.prompt.render_conversation();
            text.push_str(&render_transcript(request.rounds));

            let mut builder = self
                .model
                .completion_request(text)
                .preamble(request.prompt.system.clone())
                .temperature(self.temperature);
            if let Some(max_tokens) = self.max_tokens {
                builder = builder.max_tokens(max_tokens);
            }
            for spec in request.tools {
                builder = builder.tool(ToolDefinition {
                    name: spec.name.to_string(),
                    description: spec.description.to_string(),
                    parameters: spec.parameters.clone(),
                });
            }

            let response = self.model.completion(builder.build()).await?;
            reply_from_choice(&response.choice)
        })
    }
}

/// Render previous tool rounds as text appended to the prompt.
fn render_transcript(rounds: &[ToolRound]) -> String {
    if rounds.is_empty() {
        return String::new();
    }
    let mut out = String::from("[OUTILS]\n");
    for exchange in rounds.iter().flat_map(|round| &round.exchanges) {
        out.push_str(&format!(
            "Appel {} {}\nRésultat :\n{}\n",
            exchange.call.name, exchange.call.arguments, exchange.observation
        ));
    }
    out
}

fn reply_from_choice(choice: &rig::OneOrMany<AssistantContent>) -> AgentResult<ModelReply> {
    let mut text = String::new();
    let mut calls = Vec::new();
    for content in choice.iter() {
        match content {
            AssistantContent::Text(t) => text.push_str(&t.text),
            AssistantContent::ToolCall(call) => calls.push(ToolCallRequest {
                id: call.id.clone(),
                name: call.function.name.clone(),
                arguments: call.function.arguments.clone(),
            }),
            _ => {}
        }
    }

    if !calls.is_empty() {
        Ok(ModelReply::ToolCalls(calls))
    } else if text.trim().is_empty() {
        Err(AgentError::MalformedOutput(
            "empty completion without tool calls".to_string(),
        ))
    } else {
        Ok(ModelReply::Final(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::agent::backend::ToolExchange;

    #[test]
    fn transcript_lists_calls_and_results() {
        let rounds = vec![ToolRound {
            exchanges: vec![ToolExchange {
                call: ToolCallRequest {
                    id: "1".to_string(),
                    name: "sql_db_list_tables".to_string(),
                    arguments: serde_json::json!({}),
                },
                observation: "class_join_total_morbidite_population".to_string(),
            }],
        }];
        let out = render_transcript(&rounds);
        assert!(out.starts_with("[OUTILS]\n"));
        assert!(out.contains("Appel sql_db_list_tables {}"));
        assert!(out.contains("class_join_total_morbidite_population"));
        assert_eq!(render_transcript(&[]), "");
    }

    #[test]
    fn backend_builds_with_default_url() {
        let config = LlmConfig {
            provider: crate::assistant::core::config::LlmProvider::Ollama,
            model: "mistral:7b-instruct-q8_0".to_string(),
            ..LlmConfig::default()
        };
        let backend = OllamaRigBackend::new(&config).unwrap();
        assert_eq!(backend.base_url, DEFAULT_OLLAMA_URL);
        assert_eq!(backend.name(), "ollama");
    }
}
