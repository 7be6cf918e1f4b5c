//! Collaborative picture edit server

mod config;
mod directory;
mod editing;
mod handlers;
mod pipeline;
mod protocol;
mod rooms;
mod server;
mod state;

use anyhow::Context;
use config::Config;
use directory::InMemoryDirectory;
use handlers::AdmissionGate;
use state::AppState;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // Logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let directory = match &config.directory_file {
        Some(path) => InMemoryDirectory::load(path)?,
        None => {
            tracing::warn!("DIRECTORY_FILE not set; every handshake will be rejected");
            InMemoryDirectory::new()
        }
    };
    let (users, spaces, pictures) = directory.counts();
    tracing::info!(users, spaces, pictures, "Directory loaded");

    let gate = AdmissionGate::from_directory(Arc::new(directory));
    let state = Arc::new(AppState::new(config.clone(), gate));
    let app = server::router(state.clone());

    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    tracing::info!("Picture edit server started");
    tracing::info!("Address: {}", addr);
    tracing::info!("WebSocket: ws://{}{}", addr, server::WS_PATH);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Connections are gone; flush whatever they left in the pipeline
    state.pipeline.shutdown().await;
    tracing::info!("Picture edit server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
