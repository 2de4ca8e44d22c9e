//! Core assistant types and identifiers.

pub mod config;
pub mod errors;
pub mod ids;
pub mod turn;

pub use config::{
    AgentConfig, AnalystConfig, LlmConfig, LlmProvider, MAX_HISTORY_WINDOW, SanitizerConfig,
    Secret, ServerConfig, WarehouseConfig,
};
pub use errors::{
    AgentError, AgentResult, ChatError, ConfigError, ConnectionError, WarehouseError,
    WarehouseResult,
};
pub use ids::{SessionId, TurnId};
pub use turn::{ConversationTurn, RenderedTurn, Role};
