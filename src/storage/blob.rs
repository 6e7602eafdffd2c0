//! Blob store for raw uploads, extracted text and vector snapshots
//!
//! Paths are derived from document and job ids (`raw/{document_id}/…`,
//! `extracted/{document_id}.txt`, `embeddings/{job_id}.snapshot`), so
//! concurrent writers never collide and retried writes overwrite their own
//! previous attempt.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Trait for byte-stream storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes at the given path, overwriting any previous object
    async fn put(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Fetch an object's bytes
    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Check whether an object exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Delete an object; deleting a missing object is not an error
    async fn delete(&self, path: &str) -> Result<()>;

    /// Delete every object under a prefix, returning how many were removed
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;

    /// Check if the store is healthy
    async fn health_check(&self) -> Result<bool>;

    /// Store name for logging
    fn name(&self) -> &str;
}

/// Filesystem-backed blob store
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create a blob store rooted at the given directory
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .map_err(|e| Error::Blob(format!("Failed to create blob root: {}", e)))?;
        Ok(Self { root })
    }

    /// Resolve a logical blob path, rejecting traversal outside the root
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        if path.is_empty() || Path::new(path).is_absolute() {
            return Err(Error::Blob(format!("Invalid blob path: '{}'", path)));
        }
        for component in Path::new(path).components() {
            if matches!(component, std::path::Component::ParentDir) {
                return Err(Error::Blob(format!("Invalid blob path: '{}'", path)));
            }
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, path: &str, data: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Blob(format!("Failed to create '{}': {}", path, e)))?;
        }
        tokio::fs::write(&full, data)
            .await
            .map_err(|e| Error::Blob(format!("Failed to write '{}': {}", path, e)))?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        tokio::fs::read(&full)
            .await
            .map_err(|e| Error::Blob(format!("Failed to read '{}': {}", path, e)))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&full).await.unwrap_or(false))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Blob(format!("Failed to delete '{}': {}", path, e))),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let full = self.resolve(prefix)?;
        if !tokio::fs::try_exists(&full).await.unwrap_or(false) {
            return Ok(0);
        }
        let mut removed = 0;
        let mut stack = vec![full.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| Error::Blob(format!("Failed to list '{}': {}", prefix, e)))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Error::Blob(format!("Failed to list '{}': {}", prefix, e)))?
            {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    tokio::fs::remove_file(&path).await.map_err(|e| {
                        Error::Blob(format!("Failed to delete under '{}': {}", prefix, e))
                    })?;
                    removed += 1;
                }
            }
        }
        let _ = tokio::fs::remove_dir_all(&full).await;
        Ok(removed)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.root.exists())
    }

    fn name(&self) -> &str {
        "local-filesystem"
    }
}
