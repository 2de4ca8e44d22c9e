//! SQL tools exposed to the model.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use crate::assistant::core::errors::{WarehouseError, WarehouseResult};
use crate::assistant::warehouse::Warehouse;

use super::backend::{ToolCallRequest, ToolSpec, string_argument};

/// Lists the tables of the dataset.
pub const LIST_TABLES_TOOL: &str = "sql_db_list_tables";
/// Describes the columns of some tables.
pub const SCHEMA_TOOL: &str = "sql_db_schema";
/// Runs a read-only query.
pub const QUERY_TOOL: &str = "sql_db_query";

#[allow(clippy::expect_used)]
static TABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("static table-name pattern is valid"));

#[allow(clippy::expect_used)]
static WRITE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(insert|update|delete|merge|drop|create|alter|truncate|grant|revoke|call|execute|export|load)\b")
        .expect("static keyword pattern is valid")
});

/// Result of one tool execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolObservation {
    /// Text returned to the model.
    pub text: String,
    /// Row count, for `sql_db_query` only.
    pub rows: Option<usize>,
    /// The statement sent to the warehouse, for `sql_db_query` only.
    pub sql: Option<String>,
}

impl ToolObservation {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rows: None,
            sql: None,
        }
    }
}

/// SQL toolkit bound to one warehouse.
#[derive(Clone)]
pub struct SqlToolkit {
    warehouse: Arc<dyn Warehouse>,
    max_rows: usize,
}

impl SqlToolkit {
    /// Create a toolkit with a row cap applied to every query.
    #[must_use]
    pub fn new(warehouse: Arc<dyn Warehouse>, max_rows: usize) -> Self {
        Self {
            warehouse,
            max_rows,
        }
    }

    /// Borrow the underlying warehouse.
    #[must_use]
    pub fn warehouse(&self) -> &Arc<dyn Warehouse> {
        &self.warehouse
    }

    /// Tool declarations for the model.
    #[must_use]
    pub fn specs() -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: LIST_TABLES_TOOL,
                description: "Liste les tables disponibles dans la base. Entrée : chaîne vide.",
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "tool_input": {"type": "string", "description": "Chaîne vide."}
                    }
                }),
            },
            ToolSpec {
                name: SCHEMA_TOOL,
                description: "Renvoie les colonnes et leurs types pour les tables demandées. Appeler sql_db_list_tables d'abord.",
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "table_names": {
                            "type": "string",
                            "description": "Noms de tables séparés par des virgules."
                        }
                    },
                    "required": ["table_names"]
                }),
            },
            ToolSpec {
                name: QUERY_TOOL,
                description: "Exécute une requête SQL SELECT (BigQuery) et renvoie le résultat. En cas d'erreur, corriger la requête et réessayer.",
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Requête SQL en lecture seule."}
                    },
                    "required": ["query"]
                }),
            },
        ]
    }

    /// Execute one tool call.
    ///
    /// Unknown tools and missing arguments are reported to the model as
    /// observations, not as errors.
    ///
    /// # Errors
    /// Returns the warehouse error when the warehouse fails or rejects the
    /// statement.
    pub async fn execute(&self, call: &ToolCallRequest) -> WarehouseResult<ToolObservation> {
        debug!(tool = %call.name, "executing tool");
        match call.name.as_str() {
            LIST_TABLES_TOOL => self.list_tables().await,
            SCHEMA_TOOL => match string_argument(&call.arguments, "table_names") {
                Some(names) => self.schema(names).await,
                None => Ok(ToolObservation::text(
                    "Erreur : argument table_names manquant.",
                )),
            },
            QUERY_TOOL => match string_argument(&call.arguments, "query") {
                Some(sql) => self.query(sql).await,
                None => Ok(ToolObservation::text("Erreur : argument query manquant.")),
            },
            other => Ok(ToolObservation::text(format!(
                "Erreur : outil inconnu {other}. Outils disponibles : {LIST_TABLES_TOOL}, {SCHEMA_TOOL}, {QUERY_TOOL}."
            ))),
        }
    }

    async fn list_tables(&self) -> WarehouseResult<ToolObservation> {
        let sql = format!(
            "SELECT table_name FROM `{}`.INFORMATION_SCHEMA.TABLES ORDER BY table_name",
            self.dataset()?
        );
        let result = self.warehouse.query(&sql, self.max_rows).await?;
        let names: Vec<&str> = result
            .rows
            .iter()
            .filter_map(|row| row.first().and_then(|cell| cell.as_deref()))
            .collect();
        Ok(ToolObservation::text(names.join(", ")))
    }

    async fn schema(&self, table_names: &str) -> WarehouseResult<ToolObservation> {
        let names = parse_table_names(table_names)?;
        let quoted: Vec<String> = names.iter().map(|name| format!("'{name}'")).collect();
        let sql = format!(
            "SELECT table_name, column_name, data_type FROM `{}`.INFORMATION_SCHEMA.COLUMNS \
             WHERE table_name IN ({}) ORDER BY table_name, ordinal_position",
            self.dataset()?,
            quoted.join(", ")
        );
        // Wide tables exceed the query row cap.
        let result = self.warehouse.query(&sql, 1_000).await?;
        if result.is_empty() {
            return Err(WarehouseError::Query(format!(
                "tables introuvables : {}",
                names.join(", ")
            )));
        }

        let mut out = String::new();
        let mut current: Option<&str> = None;
        for row in &result.rows {
            let table = cell(row, 0);
            if current != Some(table) {
                out.push_str(&format!("Table {table} :\n"));
                current = Some(table);
            }
            out.push_str(&format!("  {} ({})\n", cell(row, 1), cell(row, 2)));
        }
        Ok(ToolObservation::text(out))
    }

    async fn query(&self, sql: &str) -> WarehouseResult<ToolObservation> {
        let statement = read_only_statement(sql)?;
        let result = self.warehouse.query(statement, self.max_rows).await?;
        Ok(ToolObservation {
            text: result.render(),
            rows: Some(result.rows.len()),
            sql: Some(statement.to_string()),
        })
    }

    fn dataset(&self) -> WarehouseResult<&str> {
        let dataset = self.warehouse.dataset();
        if TABLE_NAME.is_match(dataset) {
            Ok(dataset)
        } else {
            Err(WarehouseError::Malformed(format!("invalid dataset name: {dataset}")))
        }
    }
}

fn cell(row: &[Option<String>], index: usize) -> &str {
    row.get(index).and_then(|c| c.as_deref()).unwrap_or("")
}

/// Validate a comma-separated list of table names.
///
/// # Errors
/// Returns `WarehouseError::Query` for an empty list or an invalid name.
pub fn parse_table_names(raw: &str) -> WarehouseResult<Vec<&str>> {
    let names: Vec<&str> = raw
        .split(',')
        .map(|name| name.trim().trim_matches('`'))
        .filter(|name| !name.is_empty())
        .collect();
    if names.is_empty() {
        return Err(WarehouseError::Query("aucun nom de table fourni".to_string()));
    }
    if let Some(bad) = names.iter().find(|name| !TABLE_NAME.is_match(name)) {
        return Err(WarehouseError::Query(format!("nom de table invalide : {bad}")));
    }
    Ok(names)
}

/// Accept a single `SELECT` or `WITH` statement and return it without the
/// trailing semicolon.
///
/// # Errors
/// Returns `WarehouseError::ReadOnlyViolation` for anything else.
pub fn read_only_statement(sql: &str) -> WarehouseResult<&str> {
    let statement = sql.trim().trim_end_matches(';').trim_end();
    if statement.contains(';') {
        return Err(WarehouseError::ReadOnlyViolation);
    }

    let head = statement.trim_start_matches('(').trim_start();
    let keyword: String = head
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect::<String>()
        .to_ascii_lowercase();
    if keyword != "select" && keyword != "with" {
        return Err(WarehouseError::ReadOnlyViolation);
    }
    if WRITE_KEYWORD.is_match(statement) {
        return Err(WarehouseError::ReadOnlyViolation);
    }
    Ok(statement)
}
