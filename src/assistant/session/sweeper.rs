//! Background worker that drops idle sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::assistant::core::config::ServerConfig;

use super::registry::SessionRegistry;

/// Periodically evicts sessions idle for longer than the TTL.
pub struct IdleSweeper {
    registry: Arc<SessionRegistry>,
    ttl: Duration,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl IdleSweeper {
    /// Create a sweeper over `registry`.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, config: &ServerConfig) -> Self {
        Self {
            registry,
            ttl: Duration::from_secs(config.session_ttl_secs),
            interval: Duration::from_secs(config.sweep_interval_secs),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Notifier that stops the worker.
    #[must_use]
    pub fn shutdown_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Spawn the worker as a tokio task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        info!(ttl = ?self.ttl, interval = ?self.interval, "starting idle-session sweeper");
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.interval) => {
                    let evicted = self.registry.evict_idle(self.ttl);
                    if evicted > 0 {
                        info!(evicted, live = self.registry.len(), "idle sessions evicted");
                    } else {
                        debug!("no idle session to evict");
                    }
                }
                () = self.shutdown.notified() => {
                    info!("idle-session sweeper shutting down");
                    break;
                }
            }
        }
    }
}
