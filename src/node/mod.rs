//! Storage node: blob persistence and the node side of the wire protocol

pub mod blob;
pub mod server;

pub use blob::BlobStore;
pub use server::StoreNode;
