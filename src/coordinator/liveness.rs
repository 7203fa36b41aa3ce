//! Liveness monitoring
//!
//! A fixed-period task probes every registered node with a zero-payload
//! write on its control connection and evicts the ones whose write fails.
//! Eviction and directory pruning happen together in one critical section so
//! the directory never references a replica that no longer exists; the same
//! cleanup path serves probe failures and abrupt disconnects.
//!
//! A second periodic task (the inventory sweep, on the rebalance period)
//! sends a `LIST` probe to every node; the replies are logged. No data moves.

use crate::common::{CoordinatorConfig, LineSender, Message, NodeId};
use crate::coordinator::{ClusterState, SharedState};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub(crate) fn spawn_liveness_monitor(
    state: SharedState,
    config: Arc<CoordinatorConfig>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(config.probe_period());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            let members = { state.lock().registry.handles() };
            let mut dead = Vec::new();
            for node in members {
                if node.link.probe().await.is_err() {
                    dead.push(node.port);
                }
            }
            if !dead.is_empty() {
                evict_nodes(&state, &dead, config.replication);
            }
        }
    })
}

/// Unregister the given nodes and prune every entry's replica set in one
/// critical section, then report what fell under-replicated.
pub(crate) fn evict_nodes(state: &SharedState, dead: &[NodeId], replication: usize) {
    let under_replicated = {
        let mut st = state.lock();
        evict_locked(&mut st, dead, replication)
    };
    report_eviction(dead, &under_replicated);
}

/// Evict whatever the given connection still registers. A node that already
/// reconnected under the same port holds a different connection and is left
/// alone.
pub(crate) fn evict_channel(state: &SharedState, link: &LineSender, replication: usize) {
    let (dead, under_replicated) = {
        let mut st = state.lock();
        let dead = st.registry.ports_on_channel(link);
        if dead.is_empty() {
            return;
        }
        let under = evict_locked(&mut st, &dead, replication);
        (dead, under)
    };
    report_eviction(&dead, &under_replicated);
}

fn evict_locked(st: &mut ClusterState, dead: &[NodeId], replication: usize) -> Vec<String> {
    for &port in dead {
        st.registry.unregister(port);
    }
    st.directory.prune_replicas(dead, replication)
}

fn report_eviction(dead: &[NodeId], under_replicated: &[String]) {
    for port in dead {
        tracing::info!("storage node on port {} evicted", port);
    }
    for name in under_replicated {
        tracing::warn!("file {} under-replicated after node eviction", name);
    }
}

pub(crate) fn spawn_inventory_sweep(
    state: SharedState,
    config: Arc<CoordinatorConfig>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(config.rebalance_period());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick fires immediately; skip it
        tick.tick().await;
        loop {
            tick.tick().await;
            let members = { state.lock().registry.handles() };
            for node in members {
                if node
                    .link
                    .send(&Message::List { files: vec![] })
                    .await
                    .is_err()
                {
                    tracing::debug!("inventory probe to node {} failed", node.port);
                }
            }
        }
    })
}
