//! Startup helpers for the Docteur Analyste server.

use std::process::ExitCode;

use crate::assistant::core::config::AnalystConfig;
use crate::assistant::session::IdleSweeper;
use crate::server::{self, AppState};

/// Install the global tracing subscriber, `INFO` unless `RUST_LOG` says otherwise.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();
}

/// Run the HTTP server until Ctrl+C.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();
    tracing::info!("Starting Docteur Analyste v{}", env!("CARGO_PKG_VERSION"));

    let config = match AnalystConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            return ExitCode::from(1);
        }
    };
    let port = config.server.port;

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let result = rt.block_on(async move {
        let server_config = config.server.clone();
        let state = AppState::initialize(config).await;

        let sweeper = IdleSweeper::new(std::sync::Arc::clone(&state.registry), &server_config);
        let stop_sweeper = sweeper.shutdown_notifier();
        let sweeper_task = sweeper.spawn();

        let served = server::run_server_with_shutdown(state, port, shutdown_signal()).await;

        stop_sweeper.notify_one();
        if let Err(e) = sweeper_task.await {
            tracing::warn!("Sweeper task ended abnormally: {e}");
        }
        served
    });

    if let Err(e) = result {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
