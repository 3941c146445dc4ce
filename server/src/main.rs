use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use huddle_server::config::RelayConfig;
use huddle_server::engine::relay::RelayEngine;
use huddle_server::web::app_state::AppState;
use huddle_server::web::router::build_router;

#[derive(Parser)]
#[command(name = "huddle-server", about = "Huddle - real-time guild chat relay")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "huddle.toml")]
    config: String,

    /// Override the listen address from the config file.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = RelayConfig::load(&cli.config);
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }

    let engine = Arc::new(RelayEngine::new(config.to_limits()));
    let state = Arc::new(AppState::new(engine, &config));
    let listen_addr = config.server.listen_addr.clone();

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;

    info!("Huddle relay listening on ws://{}/ws", listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Huddle relay shut down");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
