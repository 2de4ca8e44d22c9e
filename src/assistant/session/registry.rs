//! Live chat sessions, keyed by id.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::assistant::core::config::AnalystConfig;
use crate::assistant::core::ids::SessionId;
use crate::assistant::pipeline::ChatSession;

/// Shared handle on one session. Submissions on a session are serialized by
/// its mutex.
pub type SessionHandle = Arc<Mutex<ChatSession>>;

struct SessionSlot {
    session: SessionHandle,
    last_seen: Instant,
}

/// Registry of live sessions.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionSlot>,
    config: AnalystConfig,
}

impl SessionRegistry {
    /// Create an empty registry; new sessions take their settings from `config`.
    #[must_use]
    pub fn new(config: AnalystConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    /// Open a new empty session.
    #[must_use]
    pub fn create(&self) -> (SessionId, SessionHandle) {
        let id = SessionId::new();
        let session = Arc::new(Mutex::new(ChatSession::from_config(id, &self.config)));
        self.sessions.insert(
            id,
            SessionSlot {
                session: Arc::clone(&session),
                last_seen: Instant::now(),
            },
        );
        debug!(session_id = %id, "session created");
        (id, session)
    }

    /// Look up a session and mark it as used.
    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.get_mut(&id).map(|mut slot| {
            slot.last_seen = Instant::now();
            Arc::clone(&slot.session)
        })
    }

    /// Drop a session.
    pub fn remove(&self, id: SessionId) -> bool {
        self.sessions.remove(&id).is_some()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions unused for longer than `ttl` and not currently busy.
    /// Returns how many were dropped.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, slot| {
            let busy = slot.session.try_lock().is_err();
            busy || slot.last_seen.elapsed() <= ttl
        });
        before.saturating_sub(self.sessions.len())
    }
}
