//! One chat session and the query pipeline it drives.
//!
//! A submission walks `Idle -> Composing -> Invoking -> Sanitizing -> Idle`,
//! or `Invoking -> Failed -> Idle` when the agent fails. The user's turn is
//! stored before the agent runs; the assistant's turn only on success.

use serde::Serialize;
use tracing::{info, warn};

use crate::assistant::agent::{
    AgentInvoker, EventSink, TurnEvent, fragments, normalize_line_endings,
};
use crate::assistant::core::config::AnalystConfig;
use crate::assistant::core::errors::ChatError;
use crate::assistant::core::ids::SessionId;
use crate::assistant::core::turn::{ConversationTurn, RenderedTurn, Role};
use crate::assistant::prompt::{SYSTEM_PROMPT, compose};
use crate::assistant::sanitizer::HistorySanitizer;
use crate::assistant::session::SessionStore;
use crate::assistant::suggestions::suggest;

/// Longest accepted user message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Shown in place of an empty history. Never stored.
pub const GREETING: &str = "Comment puis-je vous aider avec l'analyse des données médicales ?";

/// Prefix of the message shown when a turn fails.
pub const ERROR_PREFIX: &str = "❌ Désolé, une erreur s'est produite : ";

/// Where a session is in its current submission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPhase {
    /// Waiting for input.
    #[default]
    Idle,
    /// Building the prompt.
    Composing,
    /// Waiting on the agent.
    Invoking,
    /// Cleaning the answer before storing it.
    Sanitizing,
    /// The agent failed; the error is being surfaced.
    Failed,
}

/// What one submission returns to the surface.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnOutcome {
    /// Answer as produced by the agent, unsanitized.
    pub reply: Option<String>,
    /// User-facing error message when the turn failed.
    pub error: Option<String>,
    /// Follow-up suggestions for the last user message.
    pub suggestions: Vec<String>,
    /// `Idle` on success, `Failed` otherwise.
    pub phase: QueryPhase,
    /// Every query of the turn returned zero rows.
    pub all_queries_empty: bool,
}

impl TurnOutcome {
    /// Text to display: the reply or the error message.
    #[must_use]
    pub fn display_text(&self) -> &str {
        self.reply
            .as_deref()
            .or(self.error.as_deref())
            .unwrap_or_default()
    }
}

/// Per-session state: history, phase and current suggestions.
#[derive(Debug)]
pub struct ChatSession {
    id: SessionId,
    store: SessionStore,
    phase: QueryPhase,
    suggestions: Vec<String>,
    sanitizer: HistorySanitizer,
    history_window: usize,
}

impl ChatSession {
    /// Create an empty session.
    #[must_use]
    pub fn new(id: SessionId, history_window: usize, sanitizer: HistorySanitizer) -> Self {
        Self {
            id,
            store: SessionStore::new(),
            phase: QueryPhase::Idle,
            suggestions: suggest(""),
            sanitizer,
            history_window,
        }
    }

    /// Create an empty session from configuration.
    #[must_use]
    pub fn from_config(id: SessionId, config: &AnalystConfig) -> Self {
        Self::new(
            id,
            config.agent.history_window,
            HistorySanitizer::new(&config.sanitizer),
        )
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> QueryPhase {
        self.phase
    }

    /// Stored history.
    #[must_use]
    pub const fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Current follow-up suggestions. Never empty.
    #[must_use]
    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    /// History for display; an empty session shows the greeting.
    #[must_use]
    pub fn rendered_history(&self) -> Vec<RenderedTurn> {
        if self.store.is_empty() {
            return vec![RenderedTurn {
                role: Role::Assistant,
                content: GREETING.to_string(),
            }];
        }
        self.store.turns().iter().map(RenderedTurn::from).collect()
    }

    /// Forget the conversation.
    pub fn new_conversation(&mut self) {
        self.store.clear();
        self.suggestions = suggest("");
        self.phase = QueryPhase::Idle;
        info!(session_id = %self.id, "conversation reset");
    }

    /// Run one question through the agent.
    ///
    /// Agent failures do not return `Err`: they are reported in the outcome
    /// and the session stays usable.
    ///
    /// # Errors
    /// Returns `ChatError` when the message is rejected before anything is stored.
    pub async fn submit(
        &mut self,
        invoker: &AgentInvoker,
        message: &str,
        sink: &EventSink,
    ) -> Result<TurnOutcome, ChatError> {
        let message = validate_message(message)?;

        self.phase = QueryPhase::Composing;
        let prompt = compose(
            SYSTEM_PROMPT,
            self.store.recent(self.history_window),
            message,
        );
        self.store.append(ConversationTurn::human(message));

        self.phase = QueryPhase::Invoking;
        let outcome = match invoker.invoke(&prompt, sink).await {
            Ok(response) => {
                self.phase = QueryPhase::Sanitizing;
                let output = normalize_line_endings(&response.output).into_owned();
                let turn = self
                    .sanitizer
                    .sanitize(&ConversationTurn::assistant(output.as_str()));
                self.store.append(turn);
                for piece in fragments(&output) {
                    sink.emit(TurnEvent::Fragment(piece.to_string()));
                }
                info!(
                    session_id = %self.id,
                    turns = self.store.len(),
                    tools = response.raw_tool_calls.len(),
                    "turn completed"
                );
                TurnOutcome {
                    reply: Some(output),
                    error: None,
                    suggestions: Vec::new(),
                    phase: QueryPhase::Idle,
                    all_queries_empty: response.all_queries_empty,
                }
            }
            Err(err) => {
                self.phase = QueryPhase::Failed;
                warn!(session_id = %self.id, error = %err, "turn failed");
                let text = format!("{ERROR_PREFIX}{err}");
                sink.emit(TurnEvent::Fragment(text.clone()));
                TurnOutcome {
                    reply: None,
                    error: Some(text),
                    suggestions: Vec::new(),
                    phase: QueryPhase::Failed,
                    all_queries_empty: false,
                }
            }
        };

        self.suggestions = suggest(self.store.last_user_message().unwrap_or_default());
        self.phase = QueryPhase::Idle;

        let outcome = TurnOutcome {
            suggestions: self.suggestions.clone(),
            ..outcome
        };
        sink.emit(TurnEvent::Completed(outcome.clone()));
        Ok(outcome)
    }

    /// Submit the suggestion at `index` as if the user had typed it.
    ///
    /// # Errors
    /// Returns `ChatError::UnknownSuggestion` for an index out of range.
    pub async fn submit_suggestion(
        &mut self,
        invoker: &AgentInvoker,
        index: usize,
        sink: &EventSink,
    ) -> Result<TurnOutcome, ChatError> {
        let text = self
            .suggestions
            .get(index)
            .cloned()
            .ok_or(ChatError::UnknownSuggestion(index))?;
        self.submit(invoker, &text, sink).await
    }
}

/// Trim a user message and check its length.
///
/// # Errors
/// Returns `ChatError` for an empty or oversized message.
pub fn validate_message(raw: &str) -> Result<&str, ChatError> {
    let message = raw.trim();
    if message.is_empty() {
        return Err(ChatError::EmptyMessage);
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ChatError::MessageTooLong(MAX_MESSAGE_CHARS));
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::agent::fold_fragments;
    use crate::assistant::sanitizer::{SQL_MARKER, TRUNCATION_SUFFIX};
    use crate::assistant::suggestions::FALLBACK_SUGGESTION;
    use crate::assistant::testing::{answer, query_call, scripted_invoker};

    fn session() -> ChatSession {
        ChatSession::new(SessionId::new(), 4, HistorySanitizer::default())
    }

    #[test]
    fn empty_session_renders_greeting_without_storing_it() {
        let session = session();
        let rendered = session.rendered_history();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].content, GREETING);
        assert!(session.store().is_empty());
        assert_eq!(session.suggestions(), [FALLBACK_SUGGESTION.to_string()]);
    }

    #[test]
    fn validation_trims_and_bounds() {
        assert_eq!(validate_message("  Bonjour \n"), Ok("Bonjour"));
        assert_eq!(validate_message("   "), Err(ChatError::EmptyMessage));
        assert_eq!(
            validate_message(&"a".repeat(MAX_MESSAGE_CHARS + 1)),
            Err(ChatError::MessageTooLong(MAX_MESSAGE_CHARS))
        );
    }

    #[tokio::test]
    async fn rejected_message_stores_nothing() {
        let (invoker, backend) = scripted_invoker(Vec::new(), true);
        let mut session = session();
        let err = session
            .submit(&invoker, "  ", &EventSink::disabled())
            .await
            .unwrap_err();
        assert_eq!(err, ChatError::EmptyMessage);
        assert!(session.store().is_empty());
        assert!(backend.seen().is_empty());
    }

    #[tokio::test]
    async fn pathology_question_gets_pathology_suggestions() {
        let (invoker, _) = scripted_invoker(
            vec![
                query_call("SELECT COUNT(*) FROM class_join_total_morbidite_population"),
                answer("Voici les pathologies les plus fréquentes."),
            ],
            true,
        );
        let mut session = session();
        let outcome = session
            .submit(
                &invoker,
                "Quelle pathologie est la plus fréquente ?",
                &EventSink::disabled(),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome.suggestions,
            vec![
                "Quelles pathologies sont les plus fréquentes ?",
                "Évolution des hospitalisations par pathologie ?",
                "Comparaison des régions sur les pathologies.",
            ]
        );
        assert_eq!(session.store().len(), 2);
        assert_eq!(session.phase(), QueryPhase::Idle);
    }

    #[tokio::test]
    async fn courtesy_message_is_answered_without_sql_marker() {
        let (invoker, backend) = scripted_invoker(
            vec![answer(
                "Avec plaisir ! N'hésitez pas si vous avez d'autres questions.",
            )],
            true,
        );
        let mut session = session();
        let outcome = session
            .submit(&invoker, "merci", &EventSink::disabled())
            .await
            .unwrap();
        assert!(outcome.error.is_none());
        assert_eq!(backend.seen().len(), 1);
        let stored = &session.store().turns()[1];
        assert_eq!(stored.role, Role::Assistant);
        assert!(!stored.content.contains(SQL_MARKER));
        assert_eq!(outcome.suggestions, vec![FALLBACK_SUGGESTION.to_string()]);
    }

    #[tokio::test]
    async fn stored_answer_is_sanitized_but_reply_is_not() {
        let block = "x".repeat(1000);
        let text = format!("Résultats :\n```\n{block}\n```\nSELECT a FROM b");
        let (invoker, _) = scripted_invoker(vec![answer(&text)], true);
        let mut session = session();
        let outcome = session
            .submit(&invoker, "Évolution par année ?", &EventSink::disabled())
            .await
            .unwrap();
        assert_eq!(outcome.reply.as_deref(), Some(text.as_str()));
        let stored = &session.store().turns()[1].content;
        assert!(stored.contains(TRUNCATION_SUFFIX));
        assert!(stored.ends_with(SQL_MARKER));
        assert!(stored.chars().count() < text.chars().count());
    }

    #[tokio::test]
    async fn warehouse_down_surfaces_error_and_keeps_user_turn() {
        let (invoker, _) = scripted_invoker(vec![query_call("SELECT 1")], false);
        let mut session = session();
        session.store.append(ConversationTurn::human("avant"));
        session.store.append(ConversationTurn::assistant("réponse"));
        let before = session.store().len();

        let outcome = session
            .submit(
                &invoker,
                "Combien d'hospitalisations en Bretagne ?",
                &EventSink::disabled(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.phase, QueryPhase::Failed);
        assert!(outcome.reply.is_none());
        assert!(
            outcome
                .error
                .as_deref()
                .unwrap_or_default()
                .starts_with(ERROR_PREFIX)
        );
        assert_eq!(session.store().len(), before + 1);
        assert_eq!(session.store().turns()[before].role, Role::Human);
        assert_eq!(session.phase(), QueryPhase::Idle);
    }

    #[tokio::test]
    async fn prompt_window_excludes_the_new_turn() {
        let (invoker, backend) = scripted_invoker(
            vec![answer("un"), answer("deux"), answer("trois")],
            true,
        );
        let mut session = session();
        for question in ["q1", "q2", "q3"] {
            session
                .submit(&invoker, question, &EventSink::disabled())
                .await
                .unwrap();
        }
        let seen: Vec<(usize, String)> = backend
            .seen()
            .into_iter()
            .map(|step| (step.history_len, step.question))
            .collect();
        assert_eq!(
            seen,
            vec![
                (0, "q1".to_string()),
                (2, "q2".to_string()),
                (4, "q3".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn suggestion_button_submits_its_text() {
        let (invoker, _) = scripted_invoker(
            vec![answer("Réponse pathologie"), answer("Réponse suivante")],
            true,
        );
        let mut session = session();
        session
            .submit(&invoker, "Quelle maladie ?", &EventSink::disabled())
            .await
            .unwrap();
        let expected = session.suggestions()[1].clone();
        session
            .submit_suggestion(&invoker, 1, &EventSink::disabled())
            .await
            .unwrap();
        assert_eq!(session.store().last_user_message(), Some(expected.as_str()));

        let err = session
            .submit_suggestion(&invoker, 42, &EventSink::disabled())
            .await
            .unwrap_err();
        assert_eq!(err, ChatError::UnknownSuggestion(42));
    }

    #[tokio::test]
    async fn new_conversation_clears_history() {
        let (invoker, _) = scripted_invoker(vec![answer("ok")], true);
        let mut session = session();
        session
            .submit(&invoker, "région ?", &EventSink::disabled())
            .await
            .unwrap();
        session.new_conversation();
        assert!(session.store().recent(4).is_empty());
        assert_eq!(session.rendered_history()[0].content, GREETING);
        assert_eq!(session.suggestions(), [FALLBACK_SUGGESTION.to_string()]);
    }

    #[tokio::test]
    async fn stream_carries_the_reply_then_completion() {
        let (invoker, _) = scripted_invoker(vec![answer("Total : 12 000 hospitalisations")], true);
        let mut session = session();
        let (sink, stream) = EventSink::channel();
        let outcome = session.submit(&invoker, "Total ?", &sink).await.unwrap();
        drop(sink);
        assert_eq!(fold_fragments(stream).await, outcome.display_text());
    }

    #[tokio::test]
    async fn crlf_answer_is_streamed_with_plain_newlines() {
        let (invoker, _) = scripted_invoker(vec![answer("Bretagne : 1\r\nCorse : 2")], true);
        let mut session = session();
        let (sink, stream) = EventSink::channel();
        let outcome = session.submit(&invoker, "Par région ?", &sink).await.unwrap();
        drop(sink);
        assert_eq!(outcome.reply.as_deref(), Some("Bretagne : 1\nCorse : 2"));
        assert_eq!(fold_fragments(stream).await, "Bretagne : 1\nCorse : 2");
        assert!(!session.store().turns()[1].content.contains('\r'));
    }
}
