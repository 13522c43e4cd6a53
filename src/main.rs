use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollgate::config::TollgateConfig;
use tollgate::http::{AppState, HttpServer};
use tollgate::ratelimit::spawn_sweeper;

/// Rate-limited file download server.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Address to listen on, overrides the configuration file
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Directory to serve files from, overrides the configuration file
    #[arg(long)]
    root: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Tollgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = TollgateConfig::load(cli.config.as_deref())?;
    if let Some(addr) = cli.addr {
        config.server.http_addr = addr;
    }
    if let Some(root) = cli.root {
        config.server.root_dir = root;
    }
    info!(
        http_addr = %config.server.http_addr,
        capacity = config.limiter.capacity,
        reset_cycle_secs = config.limiter.reset_cycle_secs,
        reset_tokens = config.limiter.reset_tokens,
        "Configuration loaded"
    );

    let limiter = Arc::new(config.limiter.build()?);
    let sweeper = (config.limiter.sweep_interval_secs > 0).then(|| {
        spawn_sweeper(
            limiter.clone(),
            Duration::from_secs(config.limiter.sweep_interval_secs),
        )
    });

    let state = Arc::new(AppState::new(limiter, config.server.root_dir.clone()));
    HttpServer::new(config.server.http_addr, state)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    info!("Tollgate stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
