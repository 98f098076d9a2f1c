#![forbid(unsafe_code)]

mod config;
mod error;
mod routes;
mod state;
mod telemetry;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    telemetry::init(&config)?;
    run(config).await
}

async fn run(config: Config) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;

    let state = AppState::from_config(&config)?;
    info!(
        app = %config.app_name,
        version = %config.app_version,
        environment = config.environment.as_str(),
        model = %config.openai_model,
        extraction_mode = config.extraction_mode.as_str(),
        ocr_backend = state.agent.loader().ocr_backend(),
        max_file_size = config.max_file_size_bytes(),
        "Starting extraction service"
    );

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
