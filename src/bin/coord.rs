//! Coordinator binary

use clap::{Parser, Subcommand};
use replistore::{Config, Coordinator};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "replistore-coord")]
#[command(about = "replistore coordinator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the coordinator
    Serve {
        /// Bind address for the control listener
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Replication factor R
        #[arg(long)]
        replication: Option<usize>,

        /// Deadline for in-flight store/remove operations (ms)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Liveness probe period (ms)
        #[arg(long)]
        probe_period_ms: Option<u64>,

        /// Inventory sweep period (ms)
        #[arg(long)]
        rebalance_period_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            replication,
            timeout_ms,
            probe_period_ms,
            rebalance_period_ms,
        } => {
            // file config first, CLI flags take priority
            let mut config = Config::load().coordinator.unwrap_or_default();
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if let Some(replication) = replication {
                config.replication = replication;
            }
            if let Some(timeout_ms) = timeout_ms {
                config.timeout_ms = timeout_ms;
            }
            if let Some(probe_period_ms) = probe_period_ms {
                config.probe_period_ms = probe_period_ms;
            }
            if let Some(rebalance_period_ms) = rebalance_period_ms {
                config.rebalance_period_ms = rebalance_period_ms;
            }

            let coordinator = Coordinator::new(config);
            tokio::select! {
                res = coordinator.serve() => res?,
                _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
            }
        }
    }

    Ok(())
}
