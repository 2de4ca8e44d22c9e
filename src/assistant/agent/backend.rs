//! Completion backend abstraction used by the tool loop.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::assistant::core::errors::AgentResult;
use crate::assistant::prompt::ComposedPrompt;

/// Boxed future returned by completion backends.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Tool declaration sent to the model.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    /// Tool name the model calls.
    pub name: &'static str,
    /// What the tool does, for the model.
    pub description: &'static str,
    /// JSON schema of the arguments object.
    pub parameters: serde_json::Value,
}

/// One tool call requested by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-issued call id, echoed back with the result.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Arguments object.
    pub arguments: serde_json::Value,
}

/// A tool call paired with the observation it produced.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolExchange {
    /// The call as requested.
    pub call: ToolCallRequest,
    /// Text returned to the model.
    pub observation: String,
}

/// Tool calls the model issued in one step, with their results.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolRound {
    /// Exchanges in request order.
    pub exchanges: Vec<ToolExchange>,
}

/// Input of one model step.
#[derive(Clone, Copy, Debug)]
pub struct StepRequest<'a> {
    /// System instruction, history and question.
    pub prompt: &'a ComposedPrompt,
    /// Tool rounds already played in this invocation.
    pub rounds: &'a [ToolRound],
    /// Tools the model may call.
    pub tools: &'a [ToolSpec],
}

/// What the model answered in one step.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelReply {
    /// A final natural-language answer.
    Final(String),
    /// Tool calls to run before asking again.
    ToolCalls(Vec<ToolCallRequest>),
}

/// A chat-completion endpoint able to request tool calls.
pub trait CompletionBackend: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Check that the endpoint answers.
    fn ping(&self) -> BackendFuture<'_, AgentResult<()>>;

    /// Run one completion step.
    fn step<'a>(&'a self, request: StepRequest<'a>) -> BackendFuture<'a, AgentResult<ModelReply>>;
}

/// Read a tool-call argument string from either an object field or a bare
/// string.
#[must_use]
pub fn string_argument<'a>(arguments: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    match arguments {
        serde_json::Value::String(s) => Some(s.as_str()),
        serde_json::Value::Object(map) => map.get(key).and_then(serde_json::Value::as_str),
        _ => None,
    }
}

/// Parse the raw argument text some providers send instead of an object.
#[must_use]
pub fn parse_arguments(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_argument_accepts_object_or_bare_string() {
        let object = serde_json::json!({"query": "SELECT 1"});
        assert_eq!(string_argument(&object, "query"), Some("SELECT 1"));
        let bare = serde_json::Value::String("SELECT 2".to_string());
        assert_eq!(string_argument(&bare, "query"), Some("SELECT 2"));
        assert_eq!(string_argument(&serde_json::json!(3), "query"), None);
    }

    #[test]
    fn unparsable_arguments_become_a_string() {
        assert_eq!(
            parse_arguments("{\"table_names\": \"t\"}"),
            serde_json::json!({"table_names": "t"})
        );
        assert_eq!(
            parse_arguments("SELECT 1"),
            serde_json::Value::String("SELECT 1".to_string())
        );
    }
}
