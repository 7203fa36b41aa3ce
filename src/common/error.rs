//! Error types for replistore

use crate::common::protocol::Message;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Wire Errors ===
    #[error("Malformed control line: {0}")]
    Protocol(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    // === Coordination Errors ===
    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    #[error("File does not exist: {0}")]
    FileDoesNotExist(String),

    #[error("Not enough storage nodes in the cluster")]
    NotEnoughNodes,

    #[error("All replicas exhausted for: {0}")]
    LoadExhausted(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    // === Storage Node Errors ===
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("Blob too large: {size} bytes (limit {limit})")]
    BlobTooLarge { size: u64, limit: u64 },

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Error token to surface to a client, if this error is client-visible.
    ///
    /// A store that dies on its deadline is reported with the same token as a
    /// store refused for capacity, matching the wire contract.
    pub fn wire_message(&self) -> Option<Message> {
        match self {
            Error::FileAlreadyExists(_) => Some(Message::ErrorFileAlreadyExists),
            Error::FileDoesNotExist(_) => Some(Message::ErrorFileDoesNotExist),
            Error::NotEnoughNodes | Error::Timeout(_) => Some(Message::ErrorNotEnoughDstores),
            Error::LoadExhausted(_) => Some(Message::ErrorLoad),
            _ => None,
        }
    }

    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::NotEnoughNodes | Error::ConnectionClosed
        )
    }
}

// Implement From for common error types
impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
