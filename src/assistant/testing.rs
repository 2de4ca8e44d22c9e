//! Scripted completion backend and in-memory warehouse for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::assistant::agent::{
    AgentInvoker, BackendFuture, CompletionBackend, ModelReply, StepRequest, ToolCallRequest,
};
use crate::assistant::core::config::AgentConfig;
use crate::assistant::core::errors::{AgentError, AgentResult, WarehouseError, WarehouseResult};
use crate::assistant::warehouse::{ResultSet, Warehouse, WarehouseFuture};

/// What the backend saw at one step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeenStep {
    pub history_len: usize,
    pub question: String,
    pub rounds: usize,
}

/// Plays back canned replies or errors, then fails.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<AgentResult<ModelReply>>>,
    seen: Mutex<Vec<SeenStep>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<ModelReply>) -> Arc<Self> {
        Self::with_results(replies.into_iter().map(Ok).collect())
    }

    pub fn with_results(replies: Vec<AgentResult<ModelReply>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<SeenStep> {
        self.seen.lock().unwrap().clone()
    }

    /// Number of tool rounds the backend had received at each step.
    pub fn seen_rounds(&self) -> Vec<usize> {
        self.seen().iter().map(|step| step.rounds).collect()
    }
}

impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn ping(&self) -> BackendFuture<'_, AgentResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn step<'a>(&'a self, request: StepRequest<'a>) -> BackendFuture<'a, AgentResult<ModelReply>> {
        self.seen.lock().unwrap().push(SeenStep {
            history_len: request.prompt.history.len(),
            question: request.prompt.question.clone(),
            rounds: request.rounds.len(),
        });
        let next = self.replies.lock().unwrap().pop_front();
        Box::pin(async move {
            next.unwrap_or_else(|| Err(AgentError::Backend("no scripted reply".to_string())))
        })
    }
}

/// How the fake warehouse answers queries.
#[derive(Clone, Copy, Debug)]
pub enum FakeTable {
    /// A one-column table with this many rows.
    Rows(usize),
    /// Service unavailable, on ping and on query.
    Unreachable,
    /// Credentials rejected on query.
    Unauthorized,
    /// Every statement rejected as invalid SQL.
    RejectSql,
}

/// In-memory warehouse.
pub struct FakeWarehouse(pub FakeTable);

impl Warehouse for FakeWarehouse {
    fn ping(&self) -> WarehouseFuture<'_, WarehouseResult<()>> {
        Box::pin(async move {
            match self.0 {
                FakeTable::Unreachable => Err(unreachable_error()),
                _ => Ok(()),
            }
        })
    }

    fn query<'a>(
        &'a self,
        _sql: &'a str,
        max_rows: usize,
    ) -> WarehouseFuture<'a, WarehouseResult<ResultSet>> {
        Box::pin(async move {
            match self.0 {
                FakeTable::Rows(n) => Ok(ResultSet {
                    columns: vec!["total".to_string()],
                    rows: (0..n.min(max_rows))
                        .map(|i| vec![Some((12_000 + i).to_string())])
                        .collect(),
                    total_rows: n as u64,
                }),
                FakeTable::Unreachable => Err(unreachable_error()),
                FakeTable::Unauthorized => Err(WarehouseError::Unauthorized(401)),
                FakeTable::RejectSql => {
                    Err(WarehouseError::Query("Unrecognized name: nbr_hosp".to_string()))
                }
            }
        })
    }

    fn dataset(&self) -> &str {
        "final_dataset"
    }
}

fn unreachable_error() -> WarehouseError {
    WarehouseError::Status {
        status: 503,
        message: "backend unavailable".to_string(),
    }
}

/// Invoker over any backend and a fake warehouse.
pub fn invoker_over(
    backend: Arc<dyn CompletionBackend>,
    table: FakeTable,
    config: &AgentConfig,
) -> AgentInvoker {
    AgentInvoker::new(backend, Arc::new(FakeWarehouse(table)), config, 100)
}

/// Invoker over a scripted backend and a one-row warehouse, or an
/// unreachable one.
pub fn scripted_invoker(
    replies: Vec<ModelReply>,
    warehouse_up: bool,
) -> (AgentInvoker, Arc<ScriptedBackend>) {
    let backend = ScriptedBackend::new(replies);
    let table = if warehouse_up {
        FakeTable::Rows(1)
    } else {
        FakeTable::Unreachable
    };
    let invoker = invoker_over(
        Arc::clone(&backend) as Arc<dyn CompletionBackend>,
        table,
        &AgentConfig::default(),
    );
    (invoker, backend)
}

/// A `sql_db_query` call.
pub fn query_call(sql: &str) -> ModelReply {
    ModelReply::ToolCalls(vec![ToolCallRequest {
        id: "call".to_string(),
        name: "sql_db_query".to_string(),
        arguments: serde_json::json!({ "query": sql }),
    }])
}

/// A final answer.
pub fn answer(text: &str) -> ModelReply {
    ModelReply::Final(text.to_string())
}
