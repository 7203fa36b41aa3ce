//! Client CLI

use clap::{Parser, Subcommand};
use replistore::ClusterClient;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "replistore")]
#[command(about = "replistore distributed file-storage CLI")]
#[command(version)]
struct Cli {
    /// Coordinator control address
    #[arg(long, default_value = "127.0.0.1:4000")]
    coordinator: SocketAddr,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file in the cluster
    Store {
        /// File to upload
        file: PathBuf,

        /// Name in the cluster (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Load a file from the cluster
    Load {
        /// Name in the cluster
        name: String,

        /// Output path (defaults to the cluster name)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Remove a file from the cluster
    Remove {
        /// Name in the cluster
        name: String,
    },

    /// List every stored file
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = ClusterClient::new(cli.coordinator);

    match cli.command {
        Commands::Store { file, name } => {
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        anyhow::anyhow!("cannot derive a cluster name from {}", file.display())
                    })?,
            };
            let data = tokio::fs::read(&file).await?;
            client.store(&name, &data).await?;
            println!("stored {} ({} bytes)", name, data.len());
        }

        Commands::Load { name, output } => {
            let data = client.load(&name).await?;
            let target = output.unwrap_or_else(|| PathBuf::from(&name));
            tokio::fs::write(&target, &data).await?;
            println!("loaded {} ({} bytes) to {}", name, data.len(), target.display());
        }

        Commands::Remove { name } => {
            client.remove(&name).await?;
            println!("removed {}", name);
        }

        Commands::List => {
            for name in client.list().await? {
                println!("{}", name);
            }
        }
    }

    Ok(())
}
