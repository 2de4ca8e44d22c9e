//! Configuration for the assistant.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::assistant::core::errors::ConfigError;

/// Hard ceiling on the number of history turns placed in a prompt.
pub const MAX_HISTORY_WINDOW: usize = 10;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalystConfig {
    /// Completion endpoint settings.
    pub llm: LlmConfig,
    /// Data warehouse settings.
    pub warehouse: WarehouseConfig,
    /// Tool-loop settings.
    pub agent: AgentConfig,
    /// History sanitization settings.
    pub sanitizer: SanitizerConfig,
    /// HTTP surface settings.
    pub server: ServerConfig,
}

impl AnalystConfig {
    /// Load the configuration: optional JSON file named by `DOCTEUR_CONFIG`,
    /// then environment overrides.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or a variable is malformed.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("DOCTEUR_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Read a JSON configuration file.
    ///
    /// # Errors
    /// Returns an error if the file is unreadable or not valid JSON.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Override fields from `DOCTEUR_*` environment variables.
    ///
    /// # Errors
    /// Returns an error if a numeric or enum variable cannot be parsed.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(env_var)
    }

    /// Override fields from variables resolved by `lookup`.
    ///
    /// Provider-specific variables only apply to the selected provider:
    /// `DOCTEUR_OLLAMA_URL` is ignored for Azure, `DOCTEUR_AZURE_ENDPOINT`
    /// and `DOCTEUR_AZURE_DEPLOYMENT` are ignored for Ollama.
    ///
    /// # Errors
    /// Returns an error if a numeric or enum variable cannot be parsed.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("DOCTEUR_LLM_PROVIDER") {
            self.llm.provider = match provider.to_ascii_lowercase().as_str() {
                "azure" => LlmProvider::Azure,
                "ollama" => LlmProvider::Ollama,
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "DOCTEUR_LLM_PROVIDER must be azure or ollama, got {other}"
                    )));
                }
            };
        }
        match self.llm.provider {
            LlmProvider::Azure => {
                if let Some(endpoint) = lookup("DOCTEUR_AZURE_ENDPOINT") {
                    self.llm.endpoint = Some(endpoint);
                }
                if let Some(deployment) = lookup("DOCTEUR_AZURE_DEPLOYMENT") {
                    self.llm.model = deployment;
                }
            }
            LlmProvider::Ollama => {
                if let Some(url) = lookup("DOCTEUR_OLLAMA_URL") {
                    self.llm.endpoint = Some(url);
                }
            }
        }
        if let Some(key) = lookup("DOCTEUR_AZURE_API_KEY") {
            self.llm.api_key = Some(Secret::new(key));
        }
        if let Some(version) = lookup("DOCTEUR_AZURE_API_VERSION") {
            self.llm.api_version = version;
        }
        if let Some(model) = lookup("DOCTEUR_MODEL") {
            self.llm.model = model;
        }
        if let Some(project) = lookup("DOCTEUR_BIGQUERY_PROJECT") {
            self.warehouse.project_id = project;
        }
        if let Some(dataset) = lookup("DOCTEUR_BIGQUERY_DATASET") {
            self.warehouse.dataset = dataset;
        }
        if let Some(path) = lookup("DOCTEUR_BIGQUERY_CREDENTIALS")
            .or_else(|| lookup("GOOGLE_APPLICATION_CREDENTIALS"))
        {
            self.warehouse.credentials_path = Some(PathBuf::from(path));
        }
        if let Some(token) = lookup("DOCTEUR_BIGQUERY_TOKEN") {
            self.warehouse.access_token = Some(Secret::new(token));
        }
        if let Some(port) = parse_var(&lookup, "DOCTEUR_PORT")? {
            self.server.port = port;
        }
        if let Some(window) = parse_var(&lookup, "DOCTEUR_HISTORY_WINDOW")? {
            self.agent.history_window = window;
        }
        if let Some(steps) = parse_var(&lookup, "DOCTEUR_MAX_STEPS")? {
            self.agent.max_steps = steps;
        }
        if let Some(timeout) = parse_var(&lookup, "DOCTEUR_INVOKE_TIMEOUT_SECS")? {
            self.agent.invoke_timeout_secs = timeout;
        }
        Ok(())
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.history_window == 0 || self.agent.history_window > MAX_HISTORY_WINDOW {
            return Err(ConfigError::Invalid(format!(
                "agent.history_window must be within 1..={MAX_HISTORY_WINDOW}"
            )));
        }

        if self.agent.max_steps == 0 {
            return Err(ConfigError::Invalid(
                "agent.max_steps must be > 0".to_string(),
            ));
        }

        if self.agent.invoke_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "agent.invoke_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.warehouse.max_rows == 0 {
            return Err(ConfigError::Invalid(
                "warehouse.max_rows must be > 0".to_string(),
            ));
        }

        if self.sanitizer.code_block_max_chars == 0 {
            return Err(ConfigError::Invalid(
                "sanitizer.code_block_max_chars must be > 0".to_string(),
            ));
        }

        if self.warehouse.project_id.trim().is_empty() {
            return Err(ConfigError::Missing("warehouse.project_id"));
        }

        if self.warehouse.credentials_path.is_none() && self.warehouse.access_token.is_none() {
            return Err(ConfigError::Missing("warehouse.credentials_path"));
        }

        Url::parse(&self.warehouse.base_url)?;

        match self.llm.provider {
            LlmProvider::Azure => {
                let endpoint = self
                    .llm
                    .endpoint
                    .as_deref()
                    .ok_or(ConfigError::Missing("llm.endpoint"))?;
                Url::parse(endpoint)?;
                if self.llm.api_key.is_none() {
                    return Err(ConfigError::Missing("llm.api_key"));
                }
            }
            LlmProvider::Ollama => {
                if let Some(endpoint) = &self.llm.endpoint {
                    Url::parse(endpoint)?;
                }
            }
        }

        Ok(())
    }
}

/// Opaque secret; never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the secret value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Completion provider selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Azure OpenAI chat completions.
    #[default]
    Azure,
    /// Local or remote Ollama server.
    Ollama,
}

/// Completion endpoint settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Which provider serves completions.
    pub provider: LlmProvider,
    /// Azure deployment name or Ollama model name.
    pub model: String,
    /// Azure resource endpoint or Ollama base URL.
    pub endpoint: Option<String>,
    /// Azure API key.
    pub api_key: Option<Secret>,
    /// Azure REST API version.
    pub api_version: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Optional completion token cap.
    pub max_tokens: Option<u64>,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Azure,
            model: "gpt-4o".to_string(),
            endpoint: None,
            api_key: None,
            api_version: "2024-02-01".to_string(),
            temperature: 0.0,
            max_tokens: None,
            request_timeout_secs: 60,
        }
    }
}

/// Data warehouse settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// Cloud project that owns the dataset.
    pub project_id: String,
    /// Dataset holding the hospital tables.
    pub dataset: String,
    /// Service-account key file. Tokens are minted and refreshed from it.
    pub credentials_path: Option<PathBuf>,
    /// Fixed OAuth bearer token, used when no key file is set. Expires
    /// after about an hour.
    pub access_token: Option<Secret>,
    /// REST API root.
    pub base_url: String,
    /// Row cap applied to every query result.
    pub max_rows: usize,
    /// Server-side wait for a query job, in milliseconds.
    pub query_timeout_ms: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            dataset: "final_dataset".to_string(),
            credentials_path: None,
            access_token: None,
            base_url: "https://bigquery.googleapis.com/bigquery/v2".to_string(),
            max_rows: 100,
            query_timeout_ms: 30_000,
        }
    }
}

/// Tool-loop settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum model round-trips per question.
    pub max_steps: usize,
    /// Time budget for one whole invocation.
    pub invoke_timeout_secs: u64,
    /// Number of recent turns passed to the prompt.
    pub history_window: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            invoke_timeout_secs: 120,
            history_window: 4,
        }
    }
}

/// History sanitization settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Fenced code blocks longer than this are truncated.
    pub code_block_max_chars: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            code_block_max_chars: 500,
        }
    }
}

/// HTTP surface settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listening port.
    pub port: u16,
    /// Idle time after which a session is dropped.
    pub session_ttl_secs: u64,
    /// Interval between idle-session sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            session_ttl_secs: 2 * 60 * 60,
            sweep_interval_secs: 5 * 60,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| ConfigError::Invalid(format!("{name} has an invalid value: {raw}")))
        })
        .transpose()
}
