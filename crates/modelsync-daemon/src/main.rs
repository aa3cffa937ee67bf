//! modelsyncd - Registry-to-endpoint reconciliation daemon
//!
//! Watches a model registry and keeps one serving endpoint per
//! `(model, stage)` in step with it.

use clap::{Parser, Subcommand};
use modelsync_daemon::{App, DaemonConfig, DaemonResult};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// modelsync daemon CLI
#[derive(Parser)]
#[command(name = "modelsyncd")]
#[command(about = "modelsync - Registry-to-endpoint reconciliation daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MODELSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Log level, overrides the configured one
    #[arg(long, env = "MODELSYNC_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "MODELSYNC_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the artifact bucket and execution role
    Init,
    /// Remove every endpoint, config, model, bucket and role this daemon owns
    Destroy,
    /// Reconcile until interrupted
    Run {
        /// Run a single tick and exit
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    let config = DaemonConfig::load(cli.config.as_deref())?;

    // Initialize tracing
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let app = App::from_config(config);
    match cli.command {
        Command::Init => app.init().await,
        Command::Destroy => app.destroy().await,
        Command::Run { once } => run(&app, once).await,
    }
}

async fn run(app: &App, once: bool) -> DaemonResult<()> {
    app.prepare().await?;
    let scheduler = app.scheduler();

    if once {
        for result in scheduler.run_ticks(1).await {
            result?;
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    scheduler.run(shutdown_rx).await;
    tracing::info!("modelsyncd shutting down");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
