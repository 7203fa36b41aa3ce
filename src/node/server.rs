//! Storage node server
//!
//! Joins the coordinator over one persistent control connection, then serves
//! file payloads to clients on its data listener. Control traffic in: delete
//! instructions and inventory probes. Control traffic out: `JOIN` and the
//! store/remove acknowledgments that drive the coordinator's quorum logic.

use crate::common::{Error, LineSender, Message, Result, StoreNodeConfig};
use crate::node::blob::BlobStore;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};

pub struct StoreNode {
    config: StoreNodeConfig,
}

impl StoreNode {
    pub fn new(config: StoreNodeConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        let store = Arc::new(BlobStore::open(&self.config.data_dir).await?);

        // bind before JOIN so the advertised port is the real one even when
        // the config asked for an ephemeral port
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        let port = listener.local_addr()?.port();

        tracing::info!("Starting storage node");
        tracing::info!("  Data address: {}", listener.local_addr()?);
        tracing::info!("  Coordinator: {}", self.config.coordinator_addr);
        tracing::info!("  Data path: {}", self.config.data_dir.display());

        let control = TcpStream::connect(self.config.coordinator_addr).await?;
        let (control_rx, control_tx) = control.into_split();
        let control_link = LineSender::new(control_tx);
        control_link.send(&Message::Join { port }).await?;
        tracing::info!("✓ Storage node joined on port {}", port);

        let mut control_task =
            tokio::spawn(control_loop(control_rx, control_link.clone(), store.clone()));

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    let link = control_link.clone();
                    let store = store.clone();
                    let max = self.config.max_blob_size;
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, link, store, max).await {
                            tracing::debug!("client session from {} failed: {}", peer, e);
                        }
                    });
                }
                _ = &mut control_task => {
                    tracing::error!("coordinator connection lost; shutting down");
                    return Err(Error::ConnectionClosed);
                }
            }
        }
    }
}

/// React to coordinator instructions for the lifetime of the control
/// connection.
async fn control_loop(read_half: OwnedReadHalf, link: LineSender, store: Arc<BlobStore>) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("control read failed: {}", e);
                break;
            }
        };
        // liveness probes are bare NUL bytes that land glued to real lines
        let line = line.trim_matches('\0').trim();
        if line.is_empty() {
            continue;
        }
        let msg = match Message::parse(line) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("ignoring malformed control line: {}", e);
                continue;
            }
        };
        match msg {
            Message::Remove { filename } => {
                match store.delete(&filename).await {
                    Ok(false) => tracing::debug!("remove of absent blob {}", filename),
                    Ok(true) => {}
                    Err(e) => tracing::error!("delete of {} failed: {}", filename, e),
                }
                // acked regardless: the coordinator only needs the blob gone
                if link.send(&Message::RemoveAck { filename }).await.is_err() {
                    break;
                }
            }
            Message::List { .. } => match store.list().await {
                Ok(files) => {
                    if link.send(&Message::List { files }).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!("inventory listing failed: {}", e),
            },
            other => tracing::warn!("unexpected control message: {}", other),
        }
    }
    tracing::info!("control connection closed");
}

/// One short-lived client connection: a single command line, then payload
/// bytes in whichever direction the command implies.
async fn handle_client(
    stream: TcpStream,
    control: LineSender,
    store: Arc<BlobStore>,
    max_blob_size: u64,
) -> Result<()> {
    let (read_half, write_half) = stream.into_split();
    let reply = LineSender::new(write_half);
    let mut reader = BufReader::new(read_half);

    let mut first = String::new();
    if reader.read_line(&mut first).await? == 0 {
        return Ok(());
    }
    match Message::parse(first.trim())? {
        Message::Store { filename, size } => {
            if size > max_blob_size {
                return Err(Error::BlobTooLarge {
                    size,
                    limit: max_blob_size,
                });
            }
            reply.send(&Message::Ack).await?;
            let mut payload = vec![0u8; size as usize];
            reader.read_exact(&mut payload).await?;
            store.put(&filename, &payload).await?;
            control.send(&Message::StoreAck { filename }).await?;
            Ok(())
        }
        Message::LoadData { filename } => match store.get(&filename).await {
            Ok(data) => reply.send_raw(&data).await,
            // no bytes and an immediate close tell the client to reload
            Err(Error::BlobNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        },
        Message::Remove { filename } => {
            store.delete(&filename).await?;
            control.send(&Message::RemoveAck { filename }).await?;
            Ok(())
        }
        other => {
            tracing::warn!("unexpected client message: {}", other);
            Ok(())
        }
    }
}
