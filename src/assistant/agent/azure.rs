//! Azure OpenAI chat-completions backend with function calling.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assistant::core::config::{LlmConfig, Secret};
use crate::assistant::core::errors::{AgentError, AgentResult, ConfigError};
use crate::assistant::core::turn::Role;

use super::backend::{
    BackendFuture, CompletionBackend, ModelReply, StepRequest, ToolCallRequest, parse_arguments,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Debug, PartialEq, Serialize)]
struct ChatMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionSpec<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunctionSpec<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

/// Chat completions against an Azure OpenAI deployment.
pub struct AzureOpenAiBackend {
    client: Client,
    url: String,
    api_key: Secret,
    temperature: f64,
    max_tokens: Option<u64>,
}

impl AzureOpenAiBackend {
    /// Build the backend from configuration.
    ///
    /// # Errors
    /// Returns an error if the endpoint or key is missing or the HTTP client
    /// cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, ConfigError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or(ConfigError::Missing("llm.endpoint"))?;
        let api_key = config
            .api_key
            .clone()
            .ok_or(ConfigError::Missing("llm.api_key"))?;

        let mut url = url::Url::parse(endpoint)?.join(&format!(
            "openai/deployments/{}/chat/completions",
            config.model
        ))?;
        url.query_pairs_mut()
            .append_pair("api-version", &config.api_version);

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("llm http client: {e}")))?;

        Ok(Self {
            client,
            url: url.to_string(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    async fn send(&self, body: &ChatRequest<'_>) -> AgentResult<ChatResponse> {
        let response = self
            .client
            .post(&self.url)
            .header("api-key", self.api_key.expose())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::Backend(format!(
                "azure status {}: {}",
                status.as_u16(),
                text.chars().take(300).collect::<String>()
            )));
        }

        Ok(response.json::<ChatResponse>().await?)
    }
}

impl CompletionBackend for AzureOpenAiBackend {
    fn name(&self) -> &str {
        "azure-openai"
    }

    fn ping(&self) -> BackendFuture<'_, AgentResult<()>> {
        Box::pin(async move {
            let body = ChatRequest {
                messages: vec![ChatMessage::text("user", "ping")],
                temperature: 0.0,
                max_tokens: Some(1),
                tools: Vec::new(),
            };
            self.send(&body).await?;
            Ok(())
        })
    }

    fn step<'a>(&'a self, request: StepRequest<'a>) -> BackendFuture<'a, AgentResult<ModelReply>> {
        Box::pin(async move {
            let body = ChatRequest {
                messages: build_messages(&request),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: request
                    .tools
                    .iter()
                    .map(|spec| WireTool {
                        kind: "function",
                        function: WireFunctionSpec {
                            name: spec.name,
                            description: spec.description,
                            parameters: &spec.parameters,
                        },
                    })
                    .collect(),
            };
            debug!(messages = body.messages.len(), "azure completion step");
            let response = self.send(&body).await?;
            parse_reply(response)
        })
    }
}

fn build_messages(request: &StepRequest<'_>) -> Vec<ChatMessage> {
    let prompt = request.prompt;
    let mut messages = Vec::with_capacity(prompt.history.len() + 2 + request.rounds.len() * 2);
    messages.push(ChatMessage::text("system", prompt.system.clone()));
    for message in &prompt.history {
        let role = match message.role {
            Role::Human => "user",
            Role::Assistant => "assistant",
        };
        messages.push(ChatMessage::text(role, message.content.clone()));
    }
    messages.push(ChatMessage::text("user", prompt.question.clone()));

    for round in request.rounds {
        messages.push(ChatMessage {
            role: "assistant",
            content: None,
            tool_calls: round
                .exchanges
                .iter()
                .map(|exchange| WireToolCall {
                    id: exchange.call.id.clone(),
                    kind: function_kind(),
                    function: WireFunctionCall {
                        name: exchange.call.name.clone(),
                        arguments: exchange.call.arguments.to_string(),
                    },
                })
                .collect(),
            tool_call_id: None,
        });
        for exchange in &round.exchanges {
            messages.push(ChatMessage {
                role: "tool",
                content: Some(exchange.observation.clone()),
                tool_calls: Vec::new(),
                tool_call_id: Some(exchange.call.id.clone()),
            });
        }
    }
    messages
}

fn parse_reply(response: ChatResponse) -> AgentResult<ModelReply> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| AgentError::MalformedOutput("no choices in response".to_string()))?;

    if !message.tool_calls.is_empty() {
        let calls = message
            .tool_calls
            .into_iter()
            .map(|call| ToolCallRequest {
                id: call.id,
                arguments: parse_arguments(&call.function.arguments),
                name: call.function.name,
            })
            .collect();
        return Ok(ModelReply::ToolCalls(calls));
    }

    match message.content {
        Some(text) if !text.trim().is_empty() => Ok(ModelReply::Final(text)),
        _ => Err(AgentError::MalformedOutput(
            "empty message without tool calls".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::agent::backend::{ToolExchange, ToolRound};
    use crate::assistant::core::turn::ConversationTurn;
    use crate::assistant::prompt::compose;

    fn config() -> LlmConfig {
        LlmConfig {
            endpoint: Some("https://hospital.openai.azure.com/".to_string()),
            api_key: Some(Secret::new("key")),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn builds_deployment_url() {
        let backend = AzureOpenAiBackend::new(&config()).unwrap();
        assert_eq!(
            backend.url,
            "https://hospital.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-01"
        );
    }

    #[test]
    fn messages_follow_history_then_tool_rounds() {
        let history = vec![
            ConversationTurn::human("Bonjour"),
            ConversationTurn::assistant("Bonjour !"),
        ];
        let prompt = compose("Système", &history, "Combien en 2022 ?");
        let rounds = vec![ToolRound {
            exchanges: vec![ToolExchange {
                call: ToolCallRequest {
                    id: "call_1".to_string(),
                    name: "sql_db_query".to_string(),
                    arguments: serde_json::json!({"query": "SELECT 1"}),
                },
                observation: "1".to_string(),
            }],
        }];
        let request = StepRequest {
            prompt: &prompt,
            rounds: &rounds,
            tools: &[],
        };
        let messages = build_messages(&request);
        let roles: Vec<&str> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec!["system", "user", "assistant", "user", "assistant", "tool"]
        );
        assert_eq!(messages[4].tool_calls[0].function.name, "sql_db_query");
        assert_eq!(messages[5].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn parses_tool_calls_before_text() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": null,
            "tool_calls": [{"id": "c1", "type": "function",
            "function": {"name": "sql_db_query", "arguments": "{\"query\": \"SELECT 1\"}"}}]}}]}"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        match parse_reply(response).unwrap() {
            ModelReply::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].arguments, serde_json::json!({"query": "SELECT 1"}));
            }
            ModelReply::Final(text) => panic!("unexpected final answer: {text}"),
        }
    }

    #[test]
    fn empty_content_is_malformed() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "  "}}]}"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        assert!(matches!(
            parse_reply(response),
            Err(AgentError::MalformedOutput(_))
        ));
    }
}
