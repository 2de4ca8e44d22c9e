//! BigQuery REST client.
//!
//! Uses the synchronous `jobs.query` endpoint: one POST per statement, rows
//! come back inline when the job finishes within `timeoutMs`.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::assistant::core::config::WarehouseConfig;
use crate::assistant::core::errors::{ConfigError, WarehouseError, WarehouseResult};

use super::credentials::{TokenSource, token_source};
use super::{ResultSet, Warehouse, WarehouseFuture};

/// Connect timeout for the warehouse HTTP client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Extra client-side slack on top of the server-side job timeout.
const CLIENT_TIMEOUT_SLACK: Duration = Duration::from_secs(15);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    max_results: usize,
    timeout_ms: u64,
    default_dataset: DatasetReference<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference<'a> {
    project_id: &'a str,
    dataset_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    total_rows: Option<String>,
}

#[derive(Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<TableField>,
}

#[derive(Deserialize)]
struct TableField {
    name: String,
}

#[derive(Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Deserialize)]
struct TableCell {
    v: serde_json::Value,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Warehouse client backed by the BigQuery REST API.
pub struct BigQueryWarehouse {
    client: Client,
    endpoint: String,
    project_id: String,
    dataset: String,
    tokens: Box<dyn TokenSource>,
    timeout_ms: u64,
}

impl BigQueryWarehouse {
    /// Build a client from configuration.
    ///
    /// # Errors
    /// Returns an error if no credentials are configured, the key file is
    /// unusable, or the HTTP client cannot be built.
    pub fn new(config: &WarehouseConfig) -> Result<Self, ConfigError> {
        Self::with_token_source(config, token_source(config)?)
    }

    /// Build a client that asks `tokens` for a bearer token on each request.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_token_source(
        config: &WarehouseConfig,
        tokens: Box<dyn TokenSource>,
    ) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_millis(config.query_timeout_ms) + CLIENT_TIMEOUT_SLACK)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("warehouse http client: {e}")))?;

        let endpoint = format!(
            "{}/projects/{}/queries",
            config.base_url.trim_end_matches('/'),
            config.project_id
        );

        Ok(Self {
            client,
            endpoint,
            project_id: config.project_id.clone(),
            dataset: config.dataset.clone(),
            tokens,
            timeout_ms: config.query_timeout_ms,
        })
    }

    async fn run(&self, sql: &str, max_rows: usize) -> WarehouseResult<ResultSet> {
        let body = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            max_results: max_rows,
            timeout_ms: self.timeout_ms,
            default_dataset: DatasetReference {
                project_id: &self.project_id,
                dataset_id: &self.dataset,
            },
        };

        let token = self.tokens.token().await?;
        debug!(max_rows, "warehouse query");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token.expose())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(status_error(status, &text));
        }

        let parsed: QueryResponse = serde_json::from_str(&text)
            .map_err(|e| WarehouseError::Malformed(e.to_string()))?;
        into_result_set(parsed, max_rows)
    }
}

impl Warehouse for BigQueryWarehouse {
    fn ping(&self) -> WarehouseFuture<'_, WarehouseResult<()>> {
        Box::pin(async move {
            self.run("SELECT 1", 1).await?;
            Ok(())
        })
    }

    fn query<'a>(
        &'a self,
        sql: &'a str,
        max_rows: usize,
    ) -> WarehouseFuture<'a, WarehouseResult<ResultSet>> {
        Box::pin(async move { self.run(sql, max_rows).await })
    }

    fn dataset(&self) -> &str {
        &self.dataset
    }
}

fn status_error(status: StatusCode, body: &str) -> WarehouseError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.chars().take(300).collect());

    match status {
        StatusCode::BAD_REQUEST => WarehouseError::Query(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            warn!(status = status.as_u16(), "warehouse rejected credentials");
            WarehouseError::Unauthorized(status.as_u16())
        }
        _ => WarehouseError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

fn into_result_set(response: QueryResponse, max_rows: usize) -> WarehouseResult<ResultSet> {
    if !response.job_complete {
        return Err(WarehouseError::Incomplete);
    }

    let columns: Vec<String> = response
        .schema
        .map(|schema| schema.fields.into_iter().map(|field| field.name).collect())
        .unwrap_or_default();

    let rows: Vec<Vec<Option<String>>> = response
        .rows
        .into_iter()
        .take(max_rows)
        .map(|row| row.f.into_iter().map(|cell| cell_text(cell.v)).collect())
        .collect();

    let total_rows = match response.total_rows {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| WarehouseError::Malformed(format!("totalRows: {raw}")))?,
        None => rows.len() as u64,
    };

    Ok(ResultSet {
        columns,
        rows,
        total_rows,
    })
}

fn cell_text(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
