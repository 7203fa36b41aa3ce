//! Common types shared across replistore

pub mod config;
pub mod error;
pub mod protocol;

pub use config::{Config, CoordinatorConfig, StoreNodeConfig};
pub use error::{Error, Result};
pub use protocol::{LineSender, Message, NodeId};
