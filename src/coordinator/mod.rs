//! Coordinator: replica directory, quorum tracking, liveness, and sessions

pub mod directory;
pub mod liveness;
pub mod quorum;
pub mod registry;
pub mod server;
pub mod session;

pub use server::Coordinator;

use directory::ReplicaDirectory;
use parking_lot::Mutex;
use quorum::QuorumTracker;
use registry::NodeRegistry;
use std::sync::Arc;

/// All shared coordination state: node registry, replica directory, and the
/// pending-operation table, mutated as one logical unit under a single lock.
#[derive(Default)]
pub struct ClusterState {
    pub registry: NodeRegistry,
    pub directory: ReplicaDirectory,
    pub pending: QuorumTracker,
}

/// The single coordination lock. Never held across an await: handlers take
/// snapshots under it and perform network writes after release.
pub type SharedState = Arc<Mutex<ClusterState>>;
