//! Progress events emitted while a turn runs, and the stream that carries them.

use std::borrow::Cow;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::assistant::pipeline::TurnOutcome;

/// Agent progress labels shown while the user waits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingStep {
    /// The invocation started.
    Initializing,
    /// The model reads the question.
    Understanding,
    /// The model inspects tables and columns.
    ExploringSchema,
    /// A query runs against the warehouse.
    QueryingData,
    /// The model writes the final answer.
    Formulating,
}

impl ThinkingStep {
    /// French label for display.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Initializing => "Initialisation de l'analyse",
            Self::Understanding => "Compréhension de votre question",
            Self::ExploringSchema => "Exploration de la structure des données",
            Self::QueryingData => "Extraction des données pertinentes",
            Self::Formulating => "Formulation de la réponse",
        }
    }
}

/// One event of a running turn.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Progress label.
    Status(ThinkingStep),
    /// A statement was sent to the warehouse.
    SqlIssued(String),
    /// A piece of the answer text.
    Fragment(String),
    /// The turn finished; always the last event.
    Completed(TurnOutcome),
}

impl TurnEvent {
    /// Event name used on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::SqlIssued(_) => "sql",
            Self::Fragment(_) => "fragment",
            Self::Completed(_) => "completed",
        }
    }
}

/// Sending side of a turn's event channel. A disabled sink drops everything.
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<TurnEvent>>,
}

impl EventSink {
    /// A sink that discards events.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { tx: None }
    }

    /// Create a connected sink and its stream.
    #[must_use]
    pub fn channel() -> (Self, ReplyStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, ReplyStream { rx })
    }

    /// Emit an event. A dropped receiver is ignored.
    pub fn emit(&self, event: TurnEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    /// Emit a progress label.
    pub fn status(&self, step: ThinkingStep) {
        self.emit(TurnEvent::Status(step));
    }
}

/// Lazy, finite stream of turn events.
///
/// Ends once every sink clone is dropped, which happens when the turn
/// finishes. It cannot be restarted.
#[derive(Debug)]
pub struct ReplyStream {
    rx: mpsc::UnboundedReceiver<TurnEvent>,
}

impl Stream for ReplyStream {
    type Item = TurnEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Rewrite `\r\n` and lone `\r` as `\n`. SSE readers treat a bare `\r`
/// as a line break, so answers are normalized before they are streamed.
pub fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Split an answer into display fragments whose concatenation is the answer.
pub fn fragments(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive(char::is_whitespace)
}

/// Drain a stream, concatenating its fragments into a display buffer.
pub async fn fold_fragments<S>(stream: S) -> String
where
    S: Stream<Item = TurnEvent>,
{
    stream
        .fold(String::new(), |mut buffer, event| async move {
            if let TurnEvent::Fragment(piece) = event {
                buffer.push_str(&piece);
            }
            buffer
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_endings_are_normalized() {
        assert_eq!(normalize_line_endings("1\r\n2\r3\n"), "1\n2\n3\n");
        assert!(matches!(normalize_line_endings("sans retour"), Cow::Borrowed(_)));
        let normalized = normalize_line_endings("1\r\n2");
        let pieces: Vec<&str> = fragments(&normalized).collect();
        assert_eq!(pieces, vec!["1\n", "2"]);
    }

    #[test]
    fn fragments_rebuild_the_text() {
        let text = "🏥 Vue d'ensemble\n- Total : 12 000 hospitalisations  ";
        let rebuilt: String = fragments(text).collect();
        assert_eq!(rebuilt, text);
        assert!(fragments(text).count() > 1);
    }

    #[tokio::test]
    async fn stream_ends_when_sink_dropped() {
        let (sink, stream) = EventSink::channel();
        sink.status(ThinkingStep::Initializing);
        for piece in fragments("Bonjour à vous") {
            sink.emit(TurnEvent::Fragment(piece.to_string()));
        }
        drop(sink);
        assert_eq!(fold_fragments(stream).await, "Bonjour à vous");
    }

    #[test]
    fn disabled_sink_is_silent() {
        EventSink::disabled().status(ThinkingStep::Formulating);
    }
}
