//! Application state shared across all request handlers.

use std::sync::Arc;

use tracing::{error, info};

use crate::assistant::agent::{AgentInvoker, build_backend};
use crate::assistant::core::config::AnalystConfig;
use crate::assistant::core::errors::ConnectionError;
use crate::assistant::session::SessionRegistry;
use crate::assistant::warehouse::BigQueryWarehouse;

/// Whether the assistant can answer questions.
pub enum Availability {
    /// Backing services answered at startup.
    Ready(AgentInvoker),
    /// A backing service failed at startup; every submission reports the reason.
    Unavailable(String),
}

/// Shared application state.
pub struct AppState {
    /// Live chat sessions.
    pub registry: Arc<SessionRegistry>,
    /// Agent availability, fixed for the process lifetime.
    pub availability: Availability,
}

impl AppState {
    /// Connect to the warehouse and the completion endpoint.
    ///
    /// A connection failure does not abort startup: the state is built as
    /// unavailable and the server still serves history and health.
    pub async fn initialize(config: AnalystConfig) -> Arc<Self> {
        let availability = match connect(&config).await {
            Ok(invoker) => {
                info!("assistant ready");
                Availability::Ready(invoker)
            }
            Err(err) => {
                error!(error = %err, "assistant unavailable");
                Availability::Unavailable(err.to_string())
            }
        };
        Self::with_availability(config, availability)
    }

    /// Build a state around an already connected invoker.
    #[must_use]
    pub fn ready(config: AnalystConfig, invoker: AgentInvoker) -> Arc<Self> {
        Self::with_availability(config, Availability::Ready(invoker))
    }

    fn with_availability(config: AnalystConfig, availability: Availability) -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::new(SessionRegistry::new(config)),
            availability,
        })
    }

    /// The invoker, or the reason the assistant is unavailable.
    ///
    /// # Errors
    /// Returns the startup failure reason.
    pub fn invoker(&self) -> Result<&AgentInvoker, &str> {
        match &self.availability {
            Availability::Ready(invoker) => Ok(invoker),
            Availability::Unavailable(reason) => Err(reason),
        }
    }
}

/// Build the clients from configuration and ping both services.
///
/// # Errors
/// Returns a `ConnectionError` naming the service that failed.
pub async fn connect(config: &AnalystConfig) -> Result<AgentInvoker, ConnectionError> {
    config.validate()?;
    let warehouse = Arc::new(BigQueryWarehouse::new(&config.warehouse)?);
    let backend = build_backend(&config.llm)?;
    let invoker = AgentInvoker::new(
        backend,
        warehouse,
        &config.agent,
        config.warehouse.max_rows,
    );
    invoker.ping().await?;
    Ok(invoker)
}
