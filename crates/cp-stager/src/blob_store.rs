//! Object-store abstraction for `file`-kind input attachments.

use async_trait::async_trait;
use cp_error::{CpError, ErrorCode};
use std::path::{Path, PathBuf};

/// Minimal object-store surface the stager needs: fetch a key's bytes.
///
/// Implementations must be safe to share across dispatch workers.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the bytes stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, CpError>;

    /// Store `bytes` under `key`, returning the key (useful when callers
    /// let the store assign it). Used by the attachment upload route.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), CpError>;
}

/// A [`BlobStore`] backed by a directory on local disk.
///
/// Intended for tests and single-node deployments; keys map directly to
/// file paths relative to `root`.
#[derive(Debug, Clone)]
pub struct LocalDiskBlobStore {
    root: PathBuf,
}

impl LocalDiskBlobStore {
    /// Create a store rooted at `root`, creating the directory if needed is
    /// the caller's responsibility (kept out of this constructor so it can
    /// stay infallible).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, CpError> {
        let candidate = self.root.join(key);
        let normalized = crate::path::normalize_relative_path(Some(key)).ok_or_else(|| {
            CpError::new(ErrorCode::PathTraversal, "blob key escapes store root")
                .with_context("key", key)
        })?;
        debug_assert_eq!(candidate, self.root.join(&normalized));
        Ok(candidate)
    }
}

#[async_trait]
impl BlobStore for LocalDiskBlobStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, CpError> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path).await.map_err(|e| {
            CpError::new(ErrorCode::BlobStoreError, "failed to read blob")
                .with_context("key", key)
                .with_source(e)
        })
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), CpError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CpError::new(ErrorCode::BlobStoreError, "failed to create blob parent dir")
                    .with_source(e)
            })?;
        }
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            CpError::new(ErrorCode::BlobStoreError, "failed to write blob")
                .with_context("key", key)
                .with_source(e)
        })
    }
}

/// Basename of a slash-separated key, for defaulting a staged file's name.
#[must_use]
pub fn key_basename(key: &str) -> &str {
    Path::new(key)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDiskBlobStore::new(dir.path());
        store.put("a/b.txt", b"hello").await.unwrap();
        let bytes = store.get("a/b.txt").await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDiskBlobStore::new(dir.path());
        let err = store.get("../escape.txt").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PathTraversal);
    }

    #[test]
    fn basename_extracts_last_segment() {
        assert_eq!(key_basename("users/42/file.txt"), "file.txt");
        assert_eq!(key_basename("solo.txt"), "solo.txt");
    }
}
