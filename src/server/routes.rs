//! HTTP route handlers for the analyst API.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::assistant::agent::{EventSink, TurnEvent, normalize_line_endings};
use crate::assistant::core::errors::ChatError;
use crate::assistant::core::ids::SessionId;
use crate::assistant::core::turn::RenderedTurn;
use crate::assistant::pipeline::{TurnOutcome, validate_message};
use crate::assistant::session::SessionHandle;
use crate::assistant::suggestions::{Topic, matched_topics};

use super::state::AppState;

type ApiError = (StatusCode, String);

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", delete(close_session))
        .route(
            "/api/sessions/{id}/history",
            get(get_history).delete(reset_history),
        )
        .route("/api/sessions/{id}/messages", post(submit_message))
        .route("/api/sessions/{id}/messages/stream", post(stream_message))
        .route("/api/sessions/{id}/suggestions", get(get_suggestions))
        .route(
            "/api/sessions/{id}/suggestions/{index}",
            post(submit_suggestion),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, reason) = match state.invoker() {
        Ok(_) => ("ok", None),
        Err(reason) => ("unavailable", Some(reason.to_string())),
    };
    Json(serde_json::json!({
        "status": status,
        "reason": reason,
        "service": "docteur-analyste",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.registry.len(),
    }))
}

/// Session creation response.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    /// New session id.
    pub session_id: SessionId,
}

async fn create_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (session_id, _) = state.registry.create();
    (StatusCode::CREATED, Json(SessionCreated { session_id }))
}

async fn close_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> Result<StatusCode, ApiError> {
    if state.registry.remove(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, format!("session inconnue : {id}")))
    }
}

/// Rendered conversation.
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Session id.
    pub session_id: SessionId,
    /// Turns for display, oldest first.
    pub turns: Vec<RenderedTurn>,
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let session = lookup(&state, id)?;
    let turns = session.lock().await.rendered_history();
    Ok(Json(HistoryResponse {
        session_id: id,
        turns,
    }))
}

async fn reset_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> Result<StatusCode, ApiError> {
    let session = lookup(&state, id)?;
    session.lock().await.new_conversation();
    Ok(StatusCode::NO_CONTENT)
}

/// User message.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageRequest {
    /// Question text.
    pub message: String,
}

async fn submit_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let session = lookup(&state, id)?;
    let outcome = run_turn(state, session, Submission::Message(request.message)).await?;
    Ok(Json(outcome))
}

async fn stream_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
    Json(request): Json<MessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session = lookup(&state, id)?;
    state.invoker().map_err(unavailable)?;
    validate_message(&request.message).map_err(rejected)?;

    let (sink, stream) = EventSink::channel();
    let task_state = Arc::clone(&state);
    tokio::spawn(async move {
        let Ok(invoker) = task_state.invoker() else {
            return;
        };
        let result = session
            .lock()
            .await
            .submit(invoker, &request.message, &sink)
            .await;
        if let Err(err) = result {
            warn!(session_id = %id, error = %err, "streamed submission rejected");
        }
    });

    let events = stream.map(|event| Ok(to_sse(&event)));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Current suggestions.
#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestionsResponse {
    /// Topics detected in the last question, in table order.
    pub topics: Vec<Topic>,
    /// Follow-up questions, in button order.
    pub suggestions: Vec<String>,
}

async fn get_suggestions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> Result<Json<SuggestionsResponse>, ApiError> {
    let session = lookup(&state, id)?;
    let session = session.lock().await;
    Ok(Json(SuggestionsResponse {
        topics: matched_topics(session.store().last_user_message().unwrap_or_default()),
        suggestions: session.suggestions().to_vec(),
    }))
}

async fn submit_suggestion(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(SessionId, usize)>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let session = lookup(&state, id)?;
    let outcome = run_turn(state, session, Submission::Suggestion(index)).await?;
    Ok(Json(outcome))
}

enum Submission {
    Message(String),
    Suggestion(usize),
}

/// Run one turn on its own task so it completes, and the session returns to
/// `Idle`, even when the client disconnects mid-answer.
async fn run_turn(
    state: Arc<AppState>,
    session: SessionHandle,
    submission: Submission,
) -> Result<TurnOutcome, ApiError> {
    state.invoker().map_err(unavailable)?;
    let task = tokio::spawn(async move {
        let invoker = state.invoker().map_err(unavailable)?;
        let sink = EventSink::disabled();
        let mut session = session.lock().await;
        let result = match submission {
            Submission::Message(text) => session.submit(invoker, &text, &sink).await,
            Submission::Suggestion(index) => session.submit_suggestion(invoker, index, &sink).await,
        };
        result.map_err(rejected)
    });
    task.await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("tâche interrompue : {e}"),
        )
    })?
}

fn lookup(state: &AppState, id: SessionId) -> Result<SessionHandle, ApiError> {
    state
        .registry
        .get(id)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("session inconnue : {id}")))
}

fn unavailable(reason: &str) -> ApiError {
    (StatusCode::SERVICE_UNAVAILABLE, reason.to_string())
}

fn rejected(err: ChatError) -> ApiError {
    let status = match err {
        ChatError::UnknownSuggestion(_) => StatusCode::NOT_FOUND,
        ChatError::EmptyMessage | ChatError::MessageTooLong(_) => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (status, err.to_string())
}

fn to_sse(event: &TurnEvent) -> Event {
    let base = Event::default().event(event.name());
    match event {
        TurnEvent::Fragment(text) | TurnEvent::SqlIssued(text) => {
            base.data(normalize_line_endings(text))
        }
        TurnEvent::Status(step) => base.data(step.label()),
        TurnEvent::Completed(outcome) => base
            .json_data(outcome)
            .unwrap_or_else(|_| Event::default().event("completed")),
    }
}
