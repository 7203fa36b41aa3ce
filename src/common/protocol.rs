//! The control-line protocol
//!
//! Every control message is one ASCII line of space-separated tokens,
//! newline-terminated. File payloads are never framed by this codec; they
//! flow as raw bytes between clients and storage nodes after a `STORE`/`ACK`
//! or `LOAD_DATA` exchange.
//!
//! The `LIST` token is context-dependent on the wire (client request,
//! coordinator reply, node inventory probe, node inventory reply); the codec
//! carries the name list and connection role decides the interpretation.

use crate::common::{Error, Result};
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// A storage node's identity: its advertised listen port.
pub type NodeId = u16;

/// One control-line message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    // === node → coordinator ===
    Join { port: NodeId },
    StoreAck { filename: String },
    RemoveAck { filename: String },

    // === client → coordinator ===
    Store { filename: String, size: u64 },
    Load { filename: String },
    Reload { filename: String },

    // === coordinator → client ===
    StoreTo { ports: Vec<NodeId> },
    StoreComplete,
    LoadFrom { port: NodeId, size: u64 },
    RemoveComplete,
    ErrorFileAlreadyExists,
    ErrorFileDoesNotExist,
    ErrorNotEnoughDstores,
    ErrorLoad,

    // === client → node ===
    LoadData { filename: String },

    // === node → client ===
    Ack,

    // === both directions ===
    /// `REMOVE <filename>`: client request to the coordinator, and the
    /// coordinator's delete instruction to a replica.
    Remove { filename: String },
    /// `LIST`: bare form requests an enumeration; the populated form carries
    /// the resulting file names.
    List { files: Vec<String> },
}

impl Message {
    /// Parse one control line (without its trailing newline).
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let token = parts
            .next()
            .ok_or_else(|| Error::Protocol("empty line".into()))?;

        let msg = match token {
            "JOIN" => Message::Join {
                port: parse_port(field(&mut parts, line)?)?,
            },
            "STORE_ACK" => Message::StoreAck {
                filename: field(&mut parts, line)?.to_string(),
            },
            "REMOVE_ACK" => Message::RemoveAck {
                filename: field(&mut parts, line)?.to_string(),
            },
            "STORE" => Message::Store {
                filename: field(&mut parts, line)?.to_string(),
                size: parse_size(field(&mut parts, line)?)?,
            },
            "LOAD" => Message::Load {
                filename: field(&mut parts, line)?.to_string(),
            },
            "RELOAD" => Message::Reload {
                filename: field(&mut parts, line)?.to_string(),
            },
            "LOAD_DATA" => Message::LoadData {
                filename: field(&mut parts, line)?.to_string(),
            },
            "STORE_TO" => {
                let ports = parts.map(parse_port).collect::<Result<Vec<_>>>()?;
                if ports.is_empty() {
                    return Err(Error::Protocol(format!("STORE_TO without ports: {line}")));
                }
                Message::StoreTo { ports }
            }
            "LOAD_FROM" => Message::LoadFrom {
                port: parse_port(field(&mut parts, line)?)?,
                size: parse_size(field(&mut parts, line)?)?,
            },
            "REMOVE" => Message::Remove {
                filename: field(&mut parts, line)?.to_string(),
            },
            "LIST" => Message::List {
                files: parts.map(str::to_string).collect(),
            },
            "ACK" => Message::Ack,
            "STORE_COMPLETE" => Message::StoreComplete,
            "REMOVE_COMPLETE" => Message::RemoveComplete,
            "ERROR_FILE_ALREADY_EXISTS" => Message::ErrorFileAlreadyExists,
            "ERROR_FILE_DOES_NOT_EXIST" => Message::ErrorFileDoesNotExist,
            "ERROR_NOT_ENOUGH_DSTORES" => Message::ErrorNotEnoughDstores,
            "ERROR_LOAD" => Message::ErrorLoad,
            other => return Err(Error::Protocol(format!("unknown token: {other}"))),
        };
        Ok(msg)
    }
}

fn field<'a>(parts: &mut impl Iterator<Item = &'a str>, line: &str) -> Result<&'a str> {
    parts
        .next()
        .ok_or_else(|| Error::Protocol(format!("missing field in: {line}")))
}

fn parse_port(s: &str) -> Result<NodeId> {
    s.parse()
        .map_err(|_| Error::Protocol(format!("invalid port: {s}")))
}

fn parse_size(s: &str) -> Result<u64> {
    s.parse()
        .map_err(|_| Error::Protocol(format!("invalid size: {s}")))
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Join { port } => write!(f, "JOIN {port}"),
            Message::StoreAck { filename } => write!(f, "STORE_ACK {filename}"),
            Message::RemoveAck { filename } => write!(f, "REMOVE_ACK {filename}"),
            Message::Store { filename, size } => write!(f, "STORE {filename} {size}"),
            Message::Load { filename } => write!(f, "LOAD {filename}"),
            Message::Reload { filename } => write!(f, "RELOAD {filename}"),
            Message::LoadData { filename } => write!(f, "LOAD_DATA {filename}"),
            Message::StoreTo { ports } => {
                write!(f, "STORE_TO")?;
                for p in ports {
                    write!(f, " {p}")?;
                }
                Ok(())
            }
            Message::LoadFrom { port, size } => write!(f, "LOAD_FROM {port} {size}"),
            Message::Remove { filename } => write!(f, "REMOVE {filename}"),
            Message::List { files } => {
                write!(f, "LIST")?;
                for name in files {
                    write!(f, " {name}")?;
                }
                Ok(())
            }
            Message::Ack => write!(f, "ACK"),
            Message::StoreComplete => write!(f, "STORE_COMPLETE"),
            Message::RemoveComplete => write!(f, "REMOVE_COMPLETE"),
            Message::ErrorFileAlreadyExists => write!(f, "ERROR_FILE_ALREADY_EXISTS"),
            Message::ErrorFileDoesNotExist => write!(f, "ERROR_FILE_DOES_NOT_EXIST"),
            Message::ErrorNotEnoughDstores => write!(f, "ERROR_NOT_ENOUGH_DSTORES"),
            Message::ErrorLoad => write!(f, "ERROR_LOAD"),
        }
    }
}

/// Shared, line-oriented writer over one peer connection.
///
/// Cloned freely across tasks; writes are serialised per connection so
/// concurrent senders interleave whole lines, never bytes. The coordination
/// lock is never held while one of these awaits.
#[derive(Clone)]
pub struct LineSender {
    writer: Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>,
}

impl LineSender {
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Send one control message, newline-terminated.
    pub async fn send(&self, message: &Message) -> Result<()> {
        let line = format!("{message}\n");
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Send raw payload bytes (used by storage nodes streaming blob data).
    pub async fn send_raw(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Send the wire token for a client-visible error. Errors with no wire
    /// form are logged and swallowed; the peer receives nothing.
    pub async fn send_error(&self, err: &Error) -> Result<()> {
        match err.wire_message() {
            Some(msg) => self.send(&msg).await,
            None => {
                tracing::error!("no wire token for error surfaced to peer: {err}");
                Ok(())
            }
        }
    }

    /// Liveness probe: a single zero byte. Receivers strip NUL bytes before
    /// parsing lines.
    pub async fn probe(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(&[0]).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Do two handles write to the same underlying connection?
    pub fn same_channel(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.writer, &other.writer)
    }
}
