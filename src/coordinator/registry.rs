//! Node registry
//!
//! Bookkeeping of which storage nodes are currently connected. Membership is
//! insertion-ordered so replica selection is deterministic. The registry owns
//! the only durable reference to a node's control-connection writer; every
//! other component looks nodes up by port and works with a cloned handle,
//! never a registry entry.

use crate::common::{LineSender, NodeId};
use indexmap::IndexMap;

/// Handle to one registered storage node.
#[derive(Clone)]
pub struct NodeHandle {
    pub port: NodeId,
    pub link: LineSender,
}

/// Connected storage nodes, in registration order.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: IndexMap<NodeId, NodeHandle>,
}

impl NodeRegistry {
    /// Add a node. Re-registration (a node reconnecting under the same port)
    /// replaces the handle and moves the node to the end of the order.
    pub fn register(&mut self, port: NodeId, link: LineSender) {
        self.nodes.shift_remove(&port);
        self.nodes.insert(port, NodeHandle { port, link });
    }

    /// Remove a node. Idempotent; the relative order of the remaining nodes
    /// is preserved.
    pub fn unregister(&mut self, port: NodeId) -> bool {
        self.nodes.shift_remove(&port).is_some()
    }

    /// Look up a node's handle.
    pub fn get(&self, port: NodeId) -> Option<NodeHandle> {
        self.nodes.get(&port).cloned()
    }

    /// Point-in-time snapshot of member ports, in registration order.
    pub fn live_members(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    /// Point-in-time snapshot of all handles, in registration order.
    pub fn handles(&self) -> Vec<NodeHandle> {
        self.nodes.values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    /// Every port whose registration writes to the given connection. More
    /// than one entry can share a connection if a node re-joined under a new
    /// port without reconnecting.
    pub fn ports_on_channel(&self, link: &LineSender) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|h| h.link.same_channel(link))
            .map(|h| h.port)
            .collect()
    }
}
