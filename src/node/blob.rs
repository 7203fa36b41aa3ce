//! Blob persistence
//!
//! A thin wrapper over one directory of flat files; the store's state is the
//! directory listing itself. The directory is cleared on open: a restarted
//! node comes back empty and only holds what the coordinator assigns to it
//! from then on.

use crate::common::{Error, Result};
use std::path::PathBuf;
use tokio::fs;

pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Create (or clear) the data directory and open the store.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        let mut entries = fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                fs::remove_file(entry.path()).await?;
            }
        }
        Ok(Self { root })
    }

    /// Persist a blob, overwriting any previous content under the name.
    pub async fn put(&self, name: &str, data: &[u8]) -> Result<()> {
        fs::write(self.blob_path(name)?, data).await?;
        Ok(())
    }

    /// Read a blob's full content.
    pub async fn get(&self, name: &str) -> Result<Vec<u8>> {
        match fs::read(self.blob_path(name)?).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::BlobNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a blob. Idempotent; returns whether anything was deleted.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        match fs::remove_file(self.blob_path(name)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of every stored blob.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                if let Ok(name) = entry.file_name().into_string() {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    /// Blob names map to flat files; anything that would escape the data
    /// directory is rejected.
    fn blob_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(Error::InvalidFilename(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}
