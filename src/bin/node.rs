//! Storage node binary

use clap::{Parser, Subcommand};
use replistore::{Config, StoreNode};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "replistore-node")]
#[command(about = "replistore storage node")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a storage node
    Serve {
        /// Bind address for the data listener (port 0 picks one)
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Coordinator control address
        #[arg(long)]
        coordinator: Option<SocketAddr>,

        /// Blob data directory (cleared on startup)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Largest accepted blob (bytes)
        #[arg(long)]
        max_blob_size: Option<u64>,
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
            coordinator,
            data,
            max_blob_size,
        } => {
            // file config first, CLI flags take priority
            let mut config = Config::load().node.unwrap_or_default();
            if let Some(bind) = bind {
                config.listen_addr = bind;
            }
            if let Some(coordinator) = coordinator {
                config.coordinator_addr = coordinator;
            }
            if let Some(data) = data {
                config.data_dir = data;
            }
            if let Some(max_blob_size) = max_blob_size {
                config.max_blob_size = max_blob_size;
            }

            let node = StoreNode::new(config);
            tokio::select! {
                res = node.serve() => res?,
                _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
            }
        }
    }

    Ok(())
}
