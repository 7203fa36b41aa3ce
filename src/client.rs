//! Cluster client
//!
//! Drives the full wire contract from a client's side: one short-lived
//! coordinator connection per request, with file payloads pushed to (and
//! pulled from) the storage nodes directly. Loads walk the replica set via
//! `RELOAD` until a fetch succeeds or the coordinator reports exhaustion.
//!
//! Replica addresses are derived from the coordinator's host plus the port
//! the coordinator names; the cluster is assumed co-hosted, as deployed.

use crate::common::{Error, Message, NodeId, Result};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

pub struct ClusterClient {
    coordinator: SocketAddr,
}

impl ClusterClient {
    pub fn new(coordinator: SocketAddr) -> Self {
        Self { coordinator }
    }

    /// Store a file: obtain the replica assignment, push the payload to each
    /// replica, then wait for the coordinator to confirm quorum.
    pub async fn store(&self, filename: &str, data: &[u8]) -> Result<()> {
        let mut conn = Conn::open(self.coordinator).await?;
        conn.send(&Message::Store {
            filename: filename.to_string(),
            size: data.len() as u64,
        })
        .await?;

        let ports = match conn.recv().await? {
            Message::StoreTo { ports } => ports,
            Message::ErrorFileAlreadyExists => {
                return Err(Error::FileAlreadyExists(filename.to_string()))
            }
            Message::ErrorNotEnoughDstores => return Err(Error::NotEnoughNodes),
            other => {
                return Err(Error::Protocol(format!("unexpected reply to STORE: {other}")))
            }
        };

        for &port in &ports {
            if let Err(e) = self.push_replica(port, filename, data).await {
                // the coordinator's deadline decides the outcome
                tracing::warn!("push to replica {} failed: {}", port, e);
            }
        }

        match conn.recv().await? {
            Message::StoreComplete => Ok(()),
            Message::ErrorNotEnoughDstores => Err(Error::Timeout(filename.to_string())),
            other => Err(Error::Protocol(format!(
                "unexpected store outcome: {other}"
            ))),
        }
    }

    /// Load a file, retrying across replicas until one serves it.
    pub async fn load(&self, filename: &str) -> Result<Vec<u8>> {
        let mut conn = Conn::open(self.coordinator).await?;
        let mut retrying = false;
        loop {
            let request = if retrying {
                Message::Reload {
                    filename: filename.to_string(),
                }
            } else {
                Message::Load {
                    filename: filename.to_string(),
                }
            };
            conn.send(&request).await?;

            match conn.recv().await? {
                Message::LoadFrom { port, size } => {
                    match self.fetch_replica(port, filename, size).await {
                        Ok(data) => return Ok(data),
                        Err(e) => {
                            tracing::debug!("fetch from replica {} failed: {}", port, e);
                            retrying = true;
                        }
                    }
                }
                Message::ErrorFileDoesNotExist => {
                    return Err(Error::FileDoesNotExist(filename.to_string()))
                }
                Message::ErrorLoad => return Err(Error::LoadExhausted(filename.to_string())),
                other => {
                    return Err(Error::Protocol(format!("unexpected reply to LOAD: {other}")))
                }
            }
        }
    }

    /// Remove a file from the cluster namespace.
    pub async fn remove(&self, filename: &str) -> Result<()> {
        let mut conn = Conn::open(self.coordinator).await?;
        conn.send(&Message::Remove {
            filename: filename.to_string(),
        })
        .await?;
        match conn.recv().await? {
            Message::RemoveComplete => Ok(()),
            Message::ErrorFileDoesNotExist => Err(Error::FileDoesNotExist(filename.to_string())),
            other => Err(Error::Protocol(format!(
                "unexpected reply to REMOVE: {other}"
            ))),
        }
    }

    /// Enumerate every fully stored file.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut conn = Conn::open(self.coordinator).await?;
        conn.send(&Message::List { files: vec![] }).await?;
        match conn.recv().await? {
            Message::List { files } => Ok(files),
            Message::ErrorNotEnoughDstores => Err(Error::NotEnoughNodes),
            other => Err(Error::Protocol(format!("unexpected reply to LIST: {other}"))),
        }
    }

    async fn push_replica(&self, port: NodeId, filename: &str, data: &[u8]) -> Result<()> {
        let mut conn = Conn::open(self.replica_addr(port)).await?;
        conn.send(&Message::Store {
            filename: filename.to_string(),
            size: data.len() as u64,
        })
        .await?;
        match conn.recv().await? {
            Message::Ack => {}
            other => {
                return Err(Error::Protocol(format!(
                    "replica refused store handshake: {other}"
                )))
            }
        }
        conn.writer.write_all(data).await?;
        conn.writer.flush().await?;
        Ok(())
    }

    async fn fetch_replica(&self, port: NodeId, filename: &str, size: u64) -> Result<Vec<u8>> {
        let mut conn = Conn::open(self.replica_addr(port)).await?;
        conn.send(&Message::LoadData {
            filename: filename.to_string(),
        })
        .await?;
        let mut data = Vec::with_capacity(size as usize);
        conn.reader.read_to_end(&mut data).await?;
        if data.len() as u64 != size {
            return Err(Error::Protocol(format!(
                "replica {} served {} bytes, expected {}",
                port,
                data.len(),
                size
            )));
        }
        Ok(data)
    }

    fn replica_addr(&self, port: NodeId) -> SocketAddr {
        SocketAddr::new(self.coordinator.ip(), port)
    }
}

/// One line-oriented connection.
struct Conn {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Conn {
    async fn open(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    async fn send(&mut self, message: &Message) -> Result<()> {
        let line = format!("{message}\n");
        self.writer.write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Message> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(Error::ConnectionClosed);
        }
        Message::parse(line.trim())
    }
}
