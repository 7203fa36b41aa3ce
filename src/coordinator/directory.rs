//! Replica directory
//!
//! The authoritative mapping of filename → replication state. Absence from
//! the directory is the implicit "not present" state; a file only ever moves
//! along
//!
//! ```text
//! NotPresent --store--> StoreInProgress --quorum--> StoreComplete
//! StoreInProgress --timeout--> NotPresent
//! StoreComplete --remove--> RemoveInProgress --acks-or-timeout--> NotPresent
//! ```

use crate::common::NodeId;
use std::collections::HashMap;

/// Replication status of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    StoreInProgress,
    StoreComplete,
    RemoveInProgress,
}

/// One directory entry. The replica set is fixed at creation with exactly R
/// members and only ever shrinks, as a side effect of node eviction.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub size: u64,
    pub replicas: Vec<NodeId>,
    pub status: FileStatus,
}

#[derive(Default)]
pub struct ReplicaDirectory {
    files: HashMap<String, FileEntry>,
}

impl ReplicaDirectory {
    /// Create an entry for a newly accepted store.
    pub fn insert_in_progress(&mut self, filename: &str, size: u64, replicas: Vec<NodeId>) {
        self.files.insert(
            filename.to_string(),
            FileEntry {
                size,
                replicas,
                status: FileStatus::StoreInProgress,
            },
        );
    }

    pub fn get(&self, filename: &str) -> Option<&FileEntry> {
        self.files.get(filename)
    }

    pub fn status(&self, filename: &str) -> Option<FileStatus> {
        self.files.get(filename).map(|e| e.status)
    }

    /// Flip an in-progress store to complete. Returns false if the entry is
    /// gone or not in progress (a raced timeout already resolved it).
    pub fn mark_complete(&mut self, filename: &str) -> bool {
        match self.files.get_mut(filename) {
            Some(entry) if entry.status == FileStatus::StoreInProgress => {
                entry.status = FileStatus::StoreComplete;
                true
            }
            _ => false,
        }
    }

    /// Begin removal: flip a complete entry to remove-in-progress and return
    /// a snapshot of its replica set. Returns None unless the entry exists
    /// and is complete.
    pub fn mark_removing(&mut self, filename: &str) -> Option<Vec<NodeId>> {
        match self.files.get_mut(filename) {
            Some(entry) if entry.status == FileStatus::StoreComplete => {
                entry.status = FileStatus::RemoveInProgress;
                Some(entry.replicas.clone())
            }
            _ => None,
        }
    }

    /// Delete an entry outright (store abort, remove completion/timeout).
    pub fn remove(&mut self, filename: &str) -> Option<FileEntry> {
        self.files.remove(filename)
    }

    /// Every filename visible to LIST: complete entries only.
    pub fn complete_files(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|(_, e)| e.status == FileStatus::StoreComplete)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Drop dead replicas from every entry. Returns the names of complete
    /// entries whose replica count fell below the replication factor; callers
    /// report these, repair is out of scope.
    pub fn prune_replicas(&mut self, dead: &[NodeId], replication: usize) -> Vec<String> {
        let mut under_replicated = Vec::new();
        for (name, entry) in &mut self.files {
            let before = entry.replicas.len();
            entry.replicas.retain(|p| !dead.contains(p));
            if entry.replicas.len() < before
                && entry.status == FileStatus::StoreComplete
                && entry.replicas.len() < replication
            {
                under_replicated.push(name.clone());
            }
        }
        under_replicated
    }
}
