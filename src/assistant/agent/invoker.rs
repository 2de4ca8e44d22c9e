//! Tool loop between the completion backend and the SQL toolkit.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assistant::core::config::AgentConfig;
use crate::assistant::core::errors::{AgentError, AgentResult, ConnectionError};
use crate::assistant::prompt::ComposedPrompt;
use crate::assistant::warehouse::Warehouse;

use super::backend::{
    CompletionBackend, ModelReply, StepRequest, ToolCallRequest, ToolExchange, ToolRound,
};
use super::events::{EventSink, ThinkingStep, TurnEvent};
use super::tools::{LIST_TABLES_TOOL, QUERY_TOOL, SCHEMA_TOOL, SqlToolkit};

/// One tool call executed during an invocation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolTrace {
    /// Tool name.
    pub tool: String,
    /// Arguments as sent by the model.
    pub arguments: serde_json::Value,
    /// Text returned to the model.
    pub observation: String,
    /// Rows returned, for successful queries.
    pub rows: Option<usize>,
}

/// Result of a successful invocation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentResponse {
    /// Final answer text.
    pub output: String,
    /// Every tool call played, in order.
    pub raw_tool_calls: Vec<ToolTrace>,
    /// At least one query ran and every query returned zero rows.
    pub all_queries_empty: bool,
}

/// Runs the SQL agent for one question.
#[derive(Clone)]
pub struct AgentInvoker {
    backend: Arc<dyn CompletionBackend>,
    toolkit: SqlToolkit,
    max_steps: usize,
    timeout: Duration,
}

impl AgentInvoker {
    /// Create an invoker over a shared backend and warehouse.
    #[must_use]
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        warehouse: Arc<dyn Warehouse>,
        config: &AgentConfig,
        max_rows: usize,
    ) -> Self {
        Self {
            backend,
            toolkit: SqlToolkit::new(warehouse, max_rows),
            max_steps: config.max_steps,
            timeout: Duration::from_secs(config.invoke_timeout_secs),
        }
    }

    /// Ping the warehouse then the completion endpoint.
    ///
    /// # Errors
    /// Returns the first service that fails to answer.
    pub async fn ping(&self) -> Result<(), ConnectionError> {
        self.toolkit
            .warehouse()
            .ping()
            .await
            .map_err(ConnectionError::Warehouse)?;
        self.backend.ping().await.map_err(ConnectionError::Llm)?;
        info!(backend = self.backend.name(), "backing services reachable");
        Ok(())
    }

    /// Answer a composed prompt, running tools as the model requests.
    ///
    /// # Errors
    /// Returns an error on backend failure, malformed output, an exhausted
    /// step budget, a timeout, or an unrecoverable warehouse failure.
    pub async fn invoke(
        &self,
        prompt: &ComposedPrompt,
        sink: &EventSink,
    ) -> AgentResult<AgentResponse> {
        sink.status(ThinkingStep::Initializing);
        debug!(
            history = prompt.history.len(),
            prompt_bytes = prompt.estimate_len(),
            "invoking agent"
        );
        match tokio::time::timeout(self.timeout, self.run_loop(prompt, sink)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "agent invocation timed out");
                Err(AgentError::Timeout(self.timeout.as_secs()))
            }
        }
    }

    async fn run_loop(
        &self,
        prompt: &ComposedPrompt,
        sink: &EventSink,
    ) -> AgentResult<AgentResponse> {
        let tools = SqlToolkit::specs();
        let mut rounds: Vec<ToolRound> = Vec::new();
        let mut traces: Vec<ToolTrace> = Vec::new();

        sink.status(ThinkingStep::Understanding);
        for step in 1..=self.max_steps {
            let request = StepRequest {
                prompt,
                rounds: &rounds,
                tools: &tools,
            };
            let reply = self.backend.step(request).await?;

            match reply {
                ModelReply::Final(output) => {
                    if output.trim().is_empty() {
                        return Err(AgentError::MalformedOutput("empty answer".to_string()));
                    }
                    sink.status(ThinkingStep::Formulating);
                    let all_queries_empty = all_queries_empty(&traces);
                    if all_queries_empty {
                        warn!(steps = step, "every query returned zero rows");
                    }
                    info!(steps = step, tools = traces.len(), "agent produced an answer");
                    return Ok(AgentResponse {
                        output,
                        raw_tool_calls: traces,
                        all_queries_empty,
                    });
                }
                ModelReply::ToolCalls(calls) => {
                    if calls.is_empty() {
                        return Err(AgentError::MalformedOutput(
                            "tool-call reply without calls".to_string(),
                        ));
                    }
                    let mut round = ToolRound::default();
                    for call in calls {
                        let (observation, rows) = self.run_tool(&call, sink).await?;
                        traces.push(ToolTrace {
                            tool: call.name.clone(),
                            arguments: call.arguments.clone(),
                            observation: observation.clone(),
                            rows,
                        });
                        round.exchanges.push(ToolExchange { call, observation });
                    }
                    rounds.push(round);
                }
            }
        }

        warn!(max_steps = self.max_steps, "step budget exhausted");
        Err(AgentError::StepBudgetExhausted(self.max_steps))
    }

    async fn run_tool(
        &self,
        call: &ToolCallRequest,
        sink: &EventSink,
    ) -> AgentResult<(String, Option<usize>)> {
        match call.name.as_str() {
            LIST_TABLES_TOOL | SCHEMA_TOOL => sink.status(ThinkingStep::ExploringSchema),
            QUERY_TOOL => sink.status(ThinkingStep::QueryingData),
            _ => {}
        }

        match self.toolkit.execute(call).await {
            Ok(observation) => {
                if let Some(sql) = observation.sql {
                    sink.emit(TurnEvent::SqlIssued(sql));
                }
                debug!(tool = %call.name, rows = ?observation.rows, "tool finished");
                Ok((observation.text, observation.rows))
            }
            Err(err) if err.is_recoverable_by_model() => {
                warn!(tool = %call.name, error = %err, "tool error returned to the model");
                Ok((format!("Erreur : {err}"), None))
            }
            Err(err) => Err(AgentError::Warehouse(err)),
        }
    }
}

fn all_queries_empty(traces: &[ToolTrace]) -> bool {
    let mut queries = traces
        .iter()
        .filter(|trace| trace.tool == QUERY_TOOL)
        .filter_map(|trace| trace.rows)
        .peekable();
    queries.peek().is_some() && queries.all(|rows| rows == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::agent::backend::BackendFuture;
    use crate::assistant::core::errors::WarehouseError;
    use crate::assistant::prompt::compose;
    use crate::assistant::testing::{FakeTable, ScriptedBackend, answer, invoker_over, query_call};

    fn invoker(backend: &Arc<ScriptedBackend>, table: FakeTable) -> AgentInvoker {
        invoker_over(
            Arc::clone(backend) as Arc<dyn CompletionBackend>,
            table,
            &AgentConfig::default(),
        )
    }

    fn prompt() -> ComposedPrompt {
        compose("Système", &[], "Combien d'hospitalisations en 2022 ?")
    }

    #[tokio::test]
    async fn final_answer_after_one_query() {
        let backend = ScriptedBackend::new(vec![
            query_call("SELECT SUM(nbr_hospi) FROM t"),
            answer("12 000 hospitalisations."),
        ]);
        let response = invoker(&backend, FakeTable::Rows(3))
            .invoke(&prompt(), &EventSink::disabled())
            .await
            .unwrap();
        assert_eq!(response.output, "12 000 hospitalisations.");
        assert_eq!(response.raw_tool_calls.len(), 1);
        assert_eq!(response.raw_tool_calls[0].rows, Some(3));
        assert!(!response.all_queries_empty);
        assert_eq!(backend.seen_rounds(), vec![0, 1]);
    }

    #[tokio::test]
    async fn courtesy_answer_runs_no_tool() {
        let backend = ScriptedBackend::new(vec![answer("Avec plaisir !")]);
        let response = invoker(&backend, FakeTable::Rows(3))
            .invoke(&prompt(), &EventSink::disabled())
            .await
            .unwrap();
        assert!(response.raw_tool_calls.is_empty());
        assert!(!response.all_queries_empty);
    }

    #[tokio::test]
    async fn empty_results_are_flagged_not_rewritten() {
        let backend = ScriptedBackend::new(vec![query_call("SELECT 1 FROM t"), answer("Inventé")]);
        let response = invoker(&backend, FakeTable::Rows(0))
            .invoke(&prompt(), &EventSink::disabled())
            .await
            .unwrap();
        assert!(response.all_queries_empty);
        assert_eq!(response.output, "Inventé");
    }

    #[tokio::test]
    async fn sql_errors_are_fed_back() {
        let backend =
            ScriptedBackend::new(vec![query_call("SELECT nbr_hosp FROM t"), answer("Corrigé")]);
        let response = invoker(&backend, FakeTable::RejectSql)
            .invoke(&prompt(), &EventSink::disabled())
            .await
            .unwrap();
        assert!(response.raw_tool_calls[0].observation.starts_with("Erreur"));
        assert_eq!(response.raw_tool_calls[0].rows, None);
        assert_eq!(response.output, "Corrigé");
    }

    #[tokio::test]
    async fn write_statements_are_refused_to_the_model() {
        let backend = ScriptedBackend::new(vec![query_call("DROP TABLE t"), answer("Impossible.")]);
        let response = invoker(&backend, FakeTable::Rows(1))
            .invoke(&prompt(), &EventSink::disabled())
            .await
            .unwrap();
        assert!(response.raw_tool_calls[0].observation.contains("read-only"));
    }

    #[tokio::test]
    async fn rejected_credentials_abort() {
        let backend = ScriptedBackend::new(vec![query_call("SELECT 1")]);
        let err = invoker(&backend, FakeTable::Unauthorized)
            .invoke(&prompt(), &EventSink::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Warehouse(WarehouseError::Unauthorized(401))));
    }

    #[tokio::test]
    async fn unreachable_warehouse_fails_ping() {
        let backend = ScriptedBackend::new(Vec::new());
        let err = invoker(&backend, FakeTable::Unreachable).ping().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Warehouse(_)));
    }

    #[tokio::test]
    async fn step_budget_is_enforced() {
        let backend = ScriptedBackend::new((0..20).map(|_| query_call("SELECT 1")).collect());
        let err = invoker(&backend, FakeTable::Rows(1))
            .invoke(&prompt(), &EventSink::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::StepBudgetExhausted(10)));
        assert_eq!(backend.seen().len(), 10);
    }

    struct StalledBackend;

    impl CompletionBackend for StalledBackend {
        fn name(&self) -> &str {
            "stalled"
        }

        fn ping(&self) -> BackendFuture<'_, AgentResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn step<'a>(&'a self, _request: StepRequest<'a>) -> BackendFuture<'a, AgentResult<ModelReply>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(ModelReply::Final("trop tard".to_string()))
            })
        }
    }

    #[tokio::test]
    async fn invocation_is_time_bounded() {
        let config = AgentConfig {
            invoke_timeout_secs: 1,
            ..AgentConfig::default()
        };
        let invoker = invoker_over(Arc::new(StalledBackend), FakeTable::Rows(1), &config);
        let err = invoker
            .invoke(&prompt(), &EventSink::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Timeout(1)));
    }

    #[tokio::test]
    async fn backend_errors_propagate() {
        let backend =
            ScriptedBackend::with_results(vec![Err(AgentError::Backend("503".to_string()))]);
        let err = invoker(&backend, FakeTable::Rows(1))
            .invoke(&prompt(), &EventSink::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Backend(_)));
    }

    #[tokio::test]
    async fn empty_tool_call_list_is_malformed() {
        let backend = ScriptedBackend::new(vec![ModelReply::ToolCalls(Vec::new())]);
        let err = invoker(&backend, FakeTable::Rows(1))
            .invoke(&prompt(), &EventSink::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn events_report_progress_and_sql() {
        let backend = ScriptedBackend::new(vec![query_call("SELECT 1 FROM t;"), answer("Fini")]);
        let (sink, mut stream) = EventSink::channel();
        invoker(&backend, FakeTable::Rows(1))
            .invoke(&prompt(), &sink)
            .await
            .unwrap();
        drop(sink);

        let mut sql = Vec::new();
        let mut steps = Vec::new();
        while let Some(event) = futures::StreamExt::next(&mut stream).await {
            match event {
                TurnEvent::SqlIssued(statement) => sql.push(statement),
                TurnEvent::Status(step) => steps.push(step),
                _ => {}
            }
        }
        assert_eq!(sql, vec!["SELECT 1 FROM t".to_string()]);
        assert_eq!(steps.first(), Some(&ThinkingStep::Initializing));
        assert_eq!(steps.last(), Some(&ThinkingStep::Formulating));
        assert!(steps.contains(&ThinkingStep::QueryingData));
    }
}
