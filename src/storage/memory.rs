//! In-memory blob store

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::{Arc, RwLock};

use super::{normalize_prefix, BlobStore};
use crate::utils::error::{CrossValError, Result};

/// Thread-safe map from object path to bytes
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<BTreeMap<String, Arc<Vec<u8>>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, bytes: Vec<u8>) {
        let path = path.into();
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(normalize_prefix(&path).to_string(), Arc::new(bytes));
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = normalize_prefix(prefix);
        let objects = self.objects.read().map_err(|_| CrossValError::Blob {
            path: prefix.to_string(),
            message: "store lock poisoned".to_string(),
        })?;

        let listed = objects
            .keys()
            .filter(|key| {
                let rest = if prefix.is_empty() {
                    Some(key.as_str())
                } else {
                    key.strip_prefix(prefix).and_then(|r| r.strip_prefix('/'))
                };
                rest.is_some_and(|r| !r.is_empty() && !r.contains('/'))
            })
            .cloned()
            .collect();

        Ok(listed)
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let objects = self.objects.read().map_err(|_| CrossValError::Blob {
            path: path.to_string(),
            message: "store lock poisoned".to_string(),
        })?;
        let bytes = objects
            .get(normalize_prefix(path))
            .ok_or_else(|| CrossValError::Blob {
                path: path.to_string(),
                message: "no such object".to_string(),
            })?;
        Ok(Box::new(Cursor::new(bytes.as_ref().clone())))
    }

    fn describe(&self) -> String {
        format!("memory ({} objects)", self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_direct_children_only() -> Result<()> {
        let store = MemoryBlobStore::new();
        store.insert("2C/MS/b.png", vec![2]);
        store.insert("2C/MS/a.png", vec![1]);
        store.insert("2C/MS/deeper/c.png", vec![3]);
        store.insert("2C/MS-extra/d.png", vec![4]);

        assert_eq!(store.list("2C/MS")?, vec!["2C/MS/a.png", "2C/MS/b.png"]);
        assert!(store.list("2C/NON-MS")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_open_missing_object() {
        let store = MemoryBlobStore::new();
        assert!(matches!(
            store.open("missing.png"),
            Err(CrossValError::Blob { .. })
        ));
    }

    #[test]
    fn test_read_all() -> Result<()> {
        let store = MemoryBlobStore::new();
        store.insert("/a/b.bin", vec![1, 2, 3]);
        assert_eq!(store.read_all("a/b.bin")?, vec![1, 2, 3]);
        assert_eq!(store.len(), 1);
        Ok(())
    }
}
