//! # replistore
//!
//! A replicated file-storage cluster with:
//! - One coordinator brokering store/load/remove/list across storage nodes
//! - A fixed replication factor R with quorum-acknowledged writes
//! - Liveness probing of storage nodes and timeout-bounded operations
//! - A line-oriented TCP control protocol; file payloads flow directly
//!   between clients and storage nodes, never through the coordinator
//!
//! ## Architecture
//!
//! ```text
//!                  ┌──────────────────────────────┐
//!                  │         Coordinator          │
//!                  │  (replica directory, quorum  │
//!                  │   tracking, liveness probes) │
//!                  └──────┬───────────┬───────────┘
//!          control lines  │           │  control lines
//!            ┌────────────┘           └───────────┐
//!      ┌─────▼──────┐   ┌────────────┐   ┌────────▼───┐
//!      │ Node :7001 │   │ Node :7002 │   │ Node :7003 │
//!      │  (blobs)   │   │  (blobs)   │   │  (blobs)   │
//!      └─────▲──────┘   └─────▲──────┘   └────────▲───┘
//!            └────────────────┼────────────────────┘
//!                      file payloads
//!                  ┌──────────┴─────────┐
//!                  │       Client       │
//!                  └────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start the coordinator
//! ```bash
//! replistore-coord serve --bind 0.0.0.0:4000 --replication 3 --timeout-ms 2000
//! ```
//!
//! ### Start a storage node
//! ```bash
//! replistore-node serve \
//!   --bind 0.0.0.0:7001 \
//!   --coordinator 127.0.0.1:4000 \
//!   --data ./node-data
//! ```
//!
//! ### Use the CLI
//! ```bash
//! # Store a file
//! replistore store report.pdf --coordinator 127.0.0.1:4000
//!
//! # Load it back
//! replistore load report.pdf --output ./report.pdf
//!
//! # Remove and list
//! replistore remove report.pdf
//! replistore list
//! ```

pub mod client;
pub mod common;
pub mod coordinator;
pub mod node;

// Re-export commonly used types
pub use client::ClusterClient;
pub use common::{Config, Error, Result};
pub use coordinator::Coordinator;
pub use node::StoreNode;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
