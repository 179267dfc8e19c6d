//! Blob storage seam for document files and signature images
//!
//! Document bytes are opaque to the workflow core; they go in and out
//! through a [`FileStore`]. `LocalFileStore` writes under a root
//! directory and serves URLs off a base; `MemoryFileStore` backs tests.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no such file: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store bytes under a relative path and return a serveable URL.
    async fn store(&self, bytes: &[u8], path: &str) -> Result<String, FileStoreError>;

    /// Remove a previously stored file.
    async fn delete(&self, path: &str) -> Result<(), FileStoreError>;
}

/// Filesystem-backed store rooted at a directory.
pub struct LocalFileStore {
    root: PathBuf,
    base_url: String,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store(&self, bytes: &[u8], path: &str) -> Result<String, FileStoreError> {
        let full = self.root.join(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), path))
    }

    async fn delete(&self, path: &str) -> Result<(), FileStoreError> {
        let full = self.root.join(path);
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FileStoreError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryFileStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.files.lock().await.contains_key(path)
    }

    pub async fn len(&self) -> usize {
        self.files.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.lock().await.is_empty()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn store(&self, bytes: &[u8], path: &str) -> Result<String, FileStoreError> {
        self.files
            .lock()
            .await
            .insert(path.to_string(), bytes.to_vec());
        Ok(format!("memory://{}", path))
    }

    async fn delete(&self, path: &str) -> Result<(), FileStoreError> {
        self.files
            .lock()
            .await
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| FileStoreError::NotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryFileStore::new();
        let url = store.store(b"%PDF-", "documents/u1/a.pdf").await.unwrap();
        assert_eq!(url, "memory://documents/u1/a.pdf");
        assert!(store.contains("documents/u1/a.pdf").await);

        store.delete("documents/u1/a.pdf").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn deleting_missing_file_errors() {
        let store = MemoryFileStore::new();
        assert!(matches!(
            store.delete("nope").await,
            Err(FileStoreError::NotFound(_))
        ));
    }
}
