//! Conversational analyst over the hospital-statistics warehouse.
//!
//! Flow of one question: the [`pipeline::ChatSession`] composes a prompt from
//! recent history, the [`agent::AgentInvoker`] runs the SQL tool loop, the
//! [`sanitizer::HistorySanitizer`] cleans the answer before it is stored and
//! [`suggestions::suggest`] proposes follow-ups.

pub mod agent;
pub mod core;
pub mod pipeline;
pub mod prompt;
pub mod sanitizer;
pub mod session;
pub mod suggestions;
pub mod warehouse;

pub use agent::{AgentInvoker, AgentResponse, EventSink, ReplyStream, TurnEvent};
pub use self::core::{AnalystConfig, ChatError, ConnectionError, SessionId};
pub use pipeline::{ChatSession, QueryPhase, TurnOutcome};
pub use session::{SessionRegistry, SessionStore};

#[cfg(test)]
pub(crate) mod testing;
