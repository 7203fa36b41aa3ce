//! Session dispatcher and request handlers
//!
//! One task per inbound connection. A connection becomes a storage node's
//! control connection at its first `JOIN`; anything else keeps it a client
//! session. Every read-modify-write against the shared state is one short
//! critical section; replies and fan-out go out after the lock is released,
//! so no slow peer stalls unrelated operations.

use crate::common::{CoordinatorConfig, Error, LineSender, Message, NodeId, Result};
use crate::coordinator::directory::FileStatus;
use crate::coordinator::quorum::{self, AckOutcome, OpKind};
use crate::coordinator::{liveness, SharedState};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

/// Per-session record of which replicas were already offered for a read.
struct LoadCursor {
    filename: String,
    offered: HashSet<NodeId>,
}

impl LoadCursor {
    fn new(filename: String) -> Self {
        Self {
            filename,
            offered: HashSet::new(),
        }
    }
}

pub(crate) async fn handle_connection(
    state: SharedState,
    config: Arc<CoordinatorConfig>,
    stream: TcpStream,
    peer: SocketAddr,
) {
    tracing::debug!("connection from {}", peer);
    let (read_half, write_half) = stream.into_split();
    let sender = LineSender::new(write_half);
    let mut lines = BufReader::new(read_half).lines();

    // Some(port) once this connection has JOINed as a storage node
    let mut joined: Option<NodeId> = None;
    let mut cursor: Option<LoadCursor> = None;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("read error from {}: {}", peer, e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let msg = match Message::parse(line) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("ignoring malformed line from {}: {}", peer, e);
                continue;
            }
        };

        let result = match msg {
            Message::Join { port } => {
                {
                    state.lock().registry.register(port, sender.clone());
                }
                if joined != Some(port) {
                    tracing::info!("storage node joined on port {}", port);
                }
                joined = Some(port);
                cursor = None;
                Ok(())
            }
            msg => {
                if let Some(port) = joined {
                    handle_node_message(&state, &config, msg, port).await
                } else {
                    handle_client_message(&state, &config, msg, &sender, &mut cursor).await
                }
            }
        };
        if let Err(e) = result {
            tracing::debug!("session with {} ended: {}", peer, e);
            break;
        }
    }

    if joined.is_some() {
        liveness::evict_channel(&state, &sender, config.replication);
    }
    tracing::debug!("connection from {} closed", peer);
}

/// Messages arriving on a storage node's control connection. Acks are
/// attributed to the node's registered identity, never to the connection.
async fn handle_node_message(
    state: &SharedState,
    config: &CoordinatorConfig,
    msg: Message,
    port: NodeId,
) -> Result<()> {
    match msg {
        Message::StoreAck { filename } => {
            let resolved = {
                let mut st = state.lock();
                match st
                    .pending
                    .record_ack(&filename, OpKind::Store, port, config.replication)
                {
                    AckOutcome::Resolved(op) => {
                        st.directory.mark_complete(&filename);
                        Some(op)
                    }
                    AckOutcome::Progress => None,
                    AckOutcome::Ignored => {
                        tracing::debug!("ignoring stray STORE_ACK {} from node {}", filename, port);
                        None
                    }
                }
            };
            if let Some(op) = resolved {
                tracing::info!(
                    "store of {} complete: quorum of {} reached",
                    filename,
                    config.replication
                );
                if let Some(client) = op.client {
                    if let Err(e) = client.send(&Message::StoreComplete).await {
                        tracing::debug!("client gone before STORE_COMPLETE for {}: {}", filename, e);
                    }
                }
            }
            Ok(())
        }
        Message::RemoveAck { filename } => {
            let resolved = {
                let mut st = state.lock();
                match st
                    .pending
                    .record_ack(&filename, OpKind::Remove, port, config.replication)
                {
                    AckOutcome::Resolved(_) => {
                        st.directory.remove(&filename);
                        true
                    }
                    AckOutcome::Progress => false,
                    AckOutcome::Ignored => {
                        tracing::debug!("ignoring stray REMOVE_ACK {} from node {}", filename, port);
                        false
                    }
                }
            };
            if resolved {
                tracing::info!("remove of {} acknowledged by every replica", filename);
            }
            Ok(())
        }
        Message::List { files } => {
            tracing::debug!("node {} inventory: {} file(s)", port, files.len());
            Ok(())
        }
        other => {
            tracing::warn!("unexpected message from node {}: {}", port, other);
            Ok(())
        }
    }
}

async fn handle_client_message(
    state: &SharedState,
    config: &CoordinatorConfig,
    msg: Message,
    sender: &LineSender,
    cursor: &mut Option<LoadCursor>,
) -> Result<()> {
    match msg {
        Message::Store { filename, size } => {
            *cursor = None;
            handle_store(state, config, filename, size, sender).await
        }
        Message::Load { filename } | Message::Reload { filename } => {
            handle_load(state, filename, sender, cursor).await
        }
        Message::Remove { filename } => {
            *cursor = None;
            handle_remove(state, config, filename, sender).await
        }
        Message::List { .. } => {
            *cursor = None;
            handle_list(state, config, sender).await
        }
        other => {
            *cursor = None;
            tracing::warn!("unexpected client message: {}", other);
            Ok(())
        }
    }
}

async fn handle_store(
    state: &SharedState,
    config: &CoordinatorConfig,
    filename: String,
    size: u64,
    client: &LineSender,
) -> Result<()> {
    let assigned = {
        let mut st = state.lock();
        let existing = st
            .directory
            .get(&filename)
            .map(|e| (e.status, e.replicas.clone()));
        match existing {
            Some((FileStatus::StoreComplete, _)) | Some((FileStatus::RemoveInProgress, _)) => {
                Err(Error::FileAlreadyExists(filename.clone()))
            }
            Some((FileStatus::StoreInProgress, ports)) => {
                // concurrent duplicate store: coalesce onto the existing
                // replica assignment with a fresh deadline
                let epoch = match st.pending.reattach_store(&filename, client.clone()) {
                    Some(epoch) => epoch,
                    None => st.pending.begin(
                        &filename,
                        OpKind::Store,
                        ports.clone(),
                        Some(client.clone()),
                    ),
                };
                Ok((ports, epoch))
            }
            None => {
                if st.registry.count() < config.replication {
                    Err(Error::NotEnoughNodes)
                } else {
                    let ports: Vec<NodeId> = st
                        .registry
                        .live_members()
                        .into_iter()
                        .take(config.replication)
                        .collect();
                    st.directory.insert_in_progress(&filename, size, ports.clone());
                    let epoch = st.pending.begin(
                        &filename,
                        OpKind::Store,
                        ports.clone(),
                        Some(client.clone()),
                    );
                    Ok((ports, epoch))
                }
            }
        }
    };
    match assigned {
        Ok((ports, epoch)) => {
            client.send(&Message::StoreTo { ports }).await?;
            quorum::arm_store_deadline(state.clone(), filename, epoch, config.timeout());
            Ok(())
        }
        Err(e) => client.send_error(&e).await,
    }
}

async fn handle_load(
    state: &SharedState,
    filename: String,
    client: &LineSender,
    cursor: &mut Option<LoadCursor>,
) -> Result<()> {
    // switching filename starts a fresh replica walk
    if !matches!(cursor, Some(c) if c.filename == filename) {
        *cursor = None;
    }
    let walk = cursor.get_or_insert_with(|| LoadCursor::new(filename.clone()));
    let reply = {
        let st = state.lock();
        match st.directory.get(&filename) {
            Some(entry) if entry.status == FileStatus::StoreComplete => {
                match entry.replicas.iter().find(|p| !walk.offered.contains(*p)) {
                    Some(&port) => {
                        walk.offered.insert(port);
                        Message::LoadFrom {
                            port,
                            size: entry.size,
                        }
                    }
                    None => Message::ErrorLoad,
                }
            }
            _ => Message::ErrorFileDoesNotExist,
        }
    };
    if matches!(reply, Message::ErrorLoad) {
        // every replica was offered and rejected; the next load walks afresh
        *cursor = None;
    }
    client.send(&reply).await
}

async fn handle_remove(
    state: &SharedState,
    config: &CoordinatorConfig,
    filename: String,
    client: &LineSender,
) -> Result<()> {
    let begun = {
        let mut st = state.lock();
        match st.directory.mark_removing(&filename) {
            Some(replicas) => {
                let targets: Vec<_> = replicas
                    .iter()
                    .filter_map(|&p| st.registry.get(p))
                    .collect();
                let epoch = st.pending.begin(&filename, OpKind::Remove, replicas, None);
                Some((targets, epoch))
            }
            None => None,
        }
    };
    match begun {
        Some((targets, epoch)) => {
            let instruction = Message::Remove {
                filename: filename.clone(),
            };
            for node in &targets {
                if let Err(e) = node.link.send(&instruction).await {
                    tracing::debug!("delete instruction to node {} failed: {}", node.port, e);
                }
            }
            quorum::arm_remove_deadline(state.clone(), filename, epoch, config.timeout());
            client.send(&Message::RemoveComplete).await
        }
        None => client.send_error(&Error::FileDoesNotExist(filename)).await,
    }
}

async fn handle_list(
    state: &SharedState,
    config: &CoordinatorConfig,
    client: &LineSender,
) -> Result<()> {
    let listing = {
        let st = state.lock();
        if st.registry.count() < config.replication {
            None
        } else {
            Some(st.directory.complete_files())
        }
    };
    match listing {
        Some(files) => client.send(&Message::List { files }).await,
        None => client.send_error(&Error::NotEnoughNodes).await,
    }
}
