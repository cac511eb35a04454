use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use signal_backend_lib::{
    config::{LogFormat, Settings, DEFAULT_CONFIG_FILE},
    ws_router, AppState,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Join-code signaling server
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML config file; must exist when given. Without it `signal.toml` is
    /// read if present.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listening port, overrides config and environment
    #[arg(short, long)]
    port: Option<u16>,

    /// Shared store URL, e.g. redis://localhost:6379
    #[arg(long)]
    store_url: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_required(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Settings::load()
            .with_context(|| format!("loading configuration from {DEFAULT_CONFIG_FILE}"))?,
    };
    if let Some(port) = cli.port {
        settings.port = port;
    }
    if let Some(url) = cli.store_url {
        settings.store_url = Some(url);
    }
    if cli.json_logs {
        settings.log_format = LogFormat::Json;
    }

    init_tracing(&settings);

    let addr = settings.bind_addr();
    let state = AppState::connect(settings)
        .await
        .context("connecting to room store")?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "WebSocket server listening");

    ws_router::serve(listener, state, shutdown_signal()).await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match settings.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
