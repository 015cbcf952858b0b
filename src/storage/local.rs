//! Directory-backed blob store

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{normalize_prefix, BlobStore};
use crate::utils::error::{CrossValError, Result};

/// Blobs are regular files below `root`; paths use `/` separators relative to it
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        normalize_prefix(path)
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }
}

impl BlobStore for LocalBlobStore {
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = normalize_prefix(prefix);
        let dir = self.resolve(prefix);
        if !dir.is_dir() {
            return Err(CrossValError::Blob {
                path: dir.display().to_string(),
                message: "prefix is not a directory".to_string(),
            });
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| CrossValError::Blob {
                path: dir.display().to_string(),
                message: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if prefix.is_empty() {
                paths.push(name.into_owned());
            } else {
                paths.push(format!("{}/{}", prefix, name));
            }
        }

        Ok(paths)
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let file = File::open(self.resolve(path)).map_err(|e| CrossValError::Blob {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        Ok(Box::new(file))
    }

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}
