//! Coordinator server

use crate::common::{CoordinatorConfig, Result};
use crate::coordinator::{liveness, session, ClusterState, SharedState};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct Coordinator {
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self { config }
    }

    /// Bind the configured address and serve forever.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_with(listener).await
    }

    /// Serve on an already-bound listener (lets tests pick an ephemeral port).
    pub async fn serve_with(self, listener: TcpListener) -> Result<()> {
        self.config.validate()?;
        tracing::info!("Starting coordinator");
        tracing::info!("  Control address: {}", listener.local_addr()?);
        tracing::info!("  Replication factor: {}", self.config.replication);
        tracing::info!("  Operation timeout: {:?}", self.config.timeout());
        tracing::info!("  Probe period: {:?}", self.config.probe_period());

        let state: SharedState = Arc::new(Mutex::new(ClusterState::default()));
        let config = Arc::new(self.config);

        let _liveness = liveness::spawn_liveness_monitor(state.clone(), config.clone());
        let _inventory = liveness::spawn_inventory_sweep(state.clone(), config.clone());

        tracing::info!("✓ Coordinator ready");

        loop {
            let (stream, peer) = listener.accept().await?;
            tokio::spawn(session::handle_connection(
                state.clone(),
                config.clone(),
                stream,
                peer,
            ));
        }
    }
}
