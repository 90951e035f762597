use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use cachet::config::PolicyStore;
use cachet::proxy::{ProxyServer, SystemResolver};

#[derive(Parser)]
#[command(name = "cachet")]
#[command(about = "A multi-client forward HTTP/HTTPS proxy with response caching")]
struct Args {
    /// Path to the configuration file
    #[arg(default_value = "config.txt")]
    config: String,

    /// Raise the diagnostics level to debug
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load policy before installing the subscriber so LOG_LEVEL from the
    // file can set the threshold. A missing file falls back to defaults.
    let policy = Arc::new(PolicyStore::new(&args.config));
    let load_error = policy.load().await.err();
    let snapshot = policy.current();

    let level = if args.verbose {
        "debug"
    } else {
        snapshot.log_level.as_filter()
    };
    tracing_subscriber::fmt()
        .with_env_filter(format!("cachet={}", level))
        .init();

    info!("Starting cachet proxy server");
    if let Some(e) = load_error {
        warn!("{}; continuing with default configuration", e);
    }

    let server = ProxyServer::new(policy, Arc::new(SystemResolver));
    let stats = server.stats();

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Received shutdown signal, shutting down gracefully...");
        shutdown.initiate();
    });

    server.run().await?;

    if stats.is_enabled() {
        println!("{}", stats.summary());
    }
    info!("cachet shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
