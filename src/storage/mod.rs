//! Blob storage
//!
//! Read-only access to image objects grouped under folder-like prefixes.
//! Training code only depends on [`BlobStore`], so a bucket mount, a local
//! directory and an in-memory map are interchangeable.

use std::io::Read;

use crate::utils::error::{CrossValError, Result};

pub mod local;
pub mod memory;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

pub trait BlobStore: Send + Sync {
    /// Object paths directly under `prefix`, sorted lexicographically
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Open an object returned by [`BlobStore::list`] for reading
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>>;

    /// Short human-readable location, used in logs
    fn describe(&self) -> String;

    /// Read an object fully into memory
    fn read_all(&self, path: &str) -> Result<Vec<u8>> {
        let mut reader = self.open(path)?;
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| CrossValError::Blob {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        Ok(bytes)
    }
}

/// Normalize a prefix to `a/b` form (no leading or trailing slash)
pub(crate) fn normalize_prefix(prefix: &str) -> &str {
    prefix.trim_matches('/')
}
