//! Error types for the assistant subsystem.

use thiserror::Error;

/// Invalid or incomplete configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// A required secret or setting is absent.
    #[error("missing configuration value: {0}")]
    Missing(&'static str),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// Configuration file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration file is not valid JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Service-account key file could not be loaded.
    #[error("invalid credentials: {0}")]
    Credentials(String),
}

/// A backing service could not be reached when the assistant started.
///
/// The assistant stays non-functional for submissions until the process restarts.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The data warehouse did not answer the readiness check.
    #[error("connexion à l'entrepôt de données impossible : {0}")]
    Warehouse(#[source] WarehouseError),
    /// The completion endpoint did not answer the readiness check.
    #[error("connexion au modèle de langage impossible : {0}")]
    Llm(#[source] AgentError),
    /// The configuration prevented the clients from being built.
    #[error("configuration invalide : {0}")]
    Config(#[from] ConfigError),
}

/// Data warehouse error.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// Transport failure (DNS, TLS, connection refused, timeout).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The warehouse rejected the credentials.
    #[error("unauthorized (status {0})")]
    Unauthorized(u16),
    /// No access token could be obtained.
    #[error("token unavailable: {0}")]
    Credentials(String),
    /// The warehouse answered with an unexpected status.
    #[error("unexpected status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error message reported by the service.
        message: String,
    },
    /// The SQL statement was rejected (syntax, unknown column, ...).
    #[error("query rejected: {0}")]
    Query(String),
    /// The query job did not complete within its time budget.
    #[error("query did not complete in time")]
    Incomplete,
    /// The response could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// The statement is not a single read-only query.
    #[error("only read-only SELECT statements are allowed")]
    ReadOnlyViolation,
}

impl WarehouseError {
    /// Whether the error should be handed back to the model as an observation
    /// instead of aborting the turn.
    #[must_use]
    pub const fn is_recoverable_by_model(&self) -> bool {
        matches!(self, Self::Query(_) | Self::ReadOnlyViolation)
    }
}

/// Failure during a single agent invocation.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Upstream completion endpoint failed or was unreachable.
    #[error("completion error: {0}")]
    Backend(String),
    /// The model produced neither text nor a usable tool call.
    #[error("malformed model output: {0}")]
    MalformedOutput(String),
    /// The tool loop did not reach a final answer within its step budget.
    #[error("no final answer after {0} steps")]
    StepBudgetExhausted(usize),
    /// The invocation exceeded its time budget.
    #[error("invocation timed out after {0} seconds")]
    Timeout(u64),
    /// The warehouse failed in a way the model cannot recover from.
    #[error("warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),
}

impl From<reqwest::Error> for AgentError {
    fn from(value: reqwest::Error) -> Self {
        Self::Backend(value.to_string())
    }
}

impl From<rig::completion::CompletionError> for AgentError {
    fn from(value: rig::completion::CompletionError) -> Self {
        Self::Backend(value.to_string())
    }
}

/// Rejected user input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    /// The message is empty after trimming.
    #[error("le message est vide")]
    EmptyMessage,
    /// The message exceeds the accepted length.
    #[error("le message dépasse {0} caractères")]
    MessageTooLong(usize),
    /// No suggestion exists at the requested position.
    #[error("aucune suggestion à la position {0}")]
    UnknownSuggestion(usize),
}

/// Convenience result alias for warehouse operations.
pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// Convenience result alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;
