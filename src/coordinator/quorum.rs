//! Quorum tracking and operation deadlines
//!
//! One `PendingOp` per filename with an in-flight store or remove. Acks are
//! counted as distinct node identities within the chosen replica set, so
//! duplicate or racing acknowledgments commute and quorum fires exactly once.
//!
//! Every pending operation gets exactly one deadline, armed as a one-shot
//! timer task. Resolution and timer firing race by design: the timer
//! re-checks the operation (and its epoch, which a coalesced duplicate store
//! bumps) under the coordination lock before acting, so a stale timer is a
//! no-op.

use crate::common::{Error, LineSender, NodeId};
use crate::coordinator::SharedState;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Store,
    Remove,
}

/// One in-flight store or remove.
pub struct PendingOp {
    pub kind: OpKind,
    /// Replica identities that may acknowledge; fixed at creation.
    pub expected: Vec<NodeId>,
    /// Distinct replicas that have acknowledged so far.
    pub acked: HashSet<NodeId>,
    /// Client awaiting the outcome (stores only; removes answer up front).
    pub client: Option<LineSender>,
    /// Bumped when a duplicate concurrent store refreshes the deadline, so a
    /// superseded timer can recognise it lost the race.
    pub epoch: u64,
}

/// The pending-operation table, keyed by filename.
#[derive(Default)]
pub struct QuorumTracker {
    ops: HashMap<String, PendingOp>,
    epochs: u64,
}

/// What one acknowledgment did to its operation.
pub enum AckOutcome {
    /// No matching operation, wrong kind, or sender not in the replica set.
    Ignored,
    /// Counted; quorum not yet reached.
    Progress,
    /// Quorum reached; the operation is resolved and handed back.
    Resolved(PendingOp),
}

impl QuorumTracker {
    /// Register a new pending operation, replacing any stale one for the
    /// same filename. Returns the deadline epoch for the timer to capture.
    pub fn begin(
        &mut self,
        filename: &str,
        kind: OpKind,
        expected: Vec<NodeId>,
        client: Option<LineSender>,
    ) -> u64 {
        self.epochs += 1;
        self.ops.insert(
            filename.to_string(),
            PendingOp {
                kind,
                expected,
                acked: HashSet::new(),
                client,
                epoch: self.epochs,
            },
        );
        self.epochs
    }

    /// Attach a duplicate concurrent store to the existing assignment: the
    /// waiting client is replaced by the newer one, the acknowledgment set is
    /// reset (known quirk: prior partial progress is lost), and a fresh
    /// deadline epoch is issued.
    pub fn reattach_store(&mut self, filename: &str, client: LineSender) -> Option<u64> {
        let op = self.ops.get_mut(filename)?;
        if op.kind != OpKind::Store {
            return None;
        }
        self.epochs += 1;
        op.acked.clear();
        op.client = Some(client);
        op.epoch = self.epochs;
        Some(op.epoch)
    }

    /// Record one acknowledgment. `store_quorum` is the replication factor;
    /// removes instead wait for every expected replica.
    pub fn record_ack(
        &mut self,
        filename: &str,
        kind: OpKind,
        node: NodeId,
        store_quorum: usize,
    ) -> AckOutcome {
        let reached = match self.ops.get_mut(filename) {
            Some(op) if op.kind == kind && op.expected.contains(&node) => {
                op.acked.insert(node);
                let target = match op.kind {
                    OpKind::Store => store_quorum,
                    OpKind::Remove => op.expected.len(),
                };
                op.acked.len() >= target
            }
            _ => return AckOutcome::Ignored,
        };
        if reached {
            match self.ops.remove(filename) {
                Some(op) => AckOutcome::Resolved(op),
                None => AckOutcome::Ignored,
            }
        } else {
            AckOutcome::Progress
        }
    }

    /// Remove and return the operation, but only if its kind and deadline
    /// epoch still match: the timer's way of asking "am I still current?".
    pub fn take_if(&mut self, filename: &str, kind: OpKind, epoch: u64) -> Option<PendingOp> {
        let current = self
            .ops
            .get(filename)
            .map(|op| op.kind == kind && op.epoch == epoch)
            .unwrap_or(false);
        if current {
            self.ops.remove(filename)
        } else {
            None
        }
    }

    pub fn get(&self, filename: &str) -> Option<&PendingOp> {
        self.ops.get(filename)
    }
}

/// Arm the single deadline for an in-flight store. If it fires while the
/// entry is still in progress, the store is aborted: directory entry and
/// pending state deleted, waiting client told the capacity error.
pub(crate) fn arm_store_deadline(
    state: SharedState,
    filename: String,
    epoch: u64,
    timeout: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let aborted = {
            let mut st = state.lock();
            match st.pending.take_if(&filename, OpKind::Store, epoch) {
                Some(op) => {
                    st.directory.remove(&filename);
                    Some(op)
                }
                None => None,
            }
        };
        if let Some(op) = aborted {
            tracing::warn!(
                "store of {} aborted: quorum not reached before deadline",
                filename
            );
            if let Some(client) = op.client {
                let _ = client.send_error(&Error::Timeout(filename)).await;
            }
        }
    });
}

/// Arm the single deadline for an in-flight remove. Firing deletes the entry
/// whether or not every replica acknowledged; an under-acknowledged remove is
/// logged, not retried.
pub(crate) fn arm_remove_deadline(
    state: SharedState,
    filename: String,
    epoch: u64,
    timeout: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let expired = {
            let mut st = state.lock();
            st.pending
                .take_if(&filename, OpKind::Remove, epoch)
                .map(|op| {
                    st.directory.remove(&filename);
                    (op.acked.len(), op.expected.len())
                })
        };
        if let Some((acked, expected)) = expired {
            if acked < expected {
                tracing::warn!(
                    "remove of {} under-acknowledged: {}/{} replicas confirmed",
                    filename,
                    acked,
                    expected
                );
            } else {
                tracing::debug!("remove deadline for {} elapsed after full acks", filename);
            }
        }
    });
}
