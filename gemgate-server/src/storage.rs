//! Blob storage backends
//!
//! Raw `.gem` files and the JSON index snapshot are both stored through the
//! [`BlobStore`] trait, keyed by slash-separated paths such as
//! `gems/rack-2.0.1.gem` or `api/v1/dependencies.json`. A miss is always
//! reported as [`AppError::NotFound`] so callers can tell it apart from real
//! failures.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::validation::validate_blob_key;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read the object at `key`.
    async fn get(&self, key: &str) -> AppResult<Bytes>;

    /// Store `data` at `key`, replacing any previous object, and return the
    /// object's location.
    async fn put(&self, key: &str, data: Bytes) -> AppResult<String>;

    /// Remove the object at `key`.
    async fn delete(&self, key: &str) -> AppResult<()>;
}

/// Blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> AppResult<PathBuf> {
        let key = validate_blob_key(key)?;
        Ok(self.root.join(key))
    }
}

fn storage_error(op: &str, key: &str, err: std::io::Error) -> AppError {
    if err.kind() == ErrorKind::NotFound {
        AppError::NotFound(format!("No such key: {key}"))
    } else {
        AppError::Storage(format!("{op} {key}: {err}"))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn get(&self, key: &str) -> AppResult<Bytes> {
        let path = self.path_for(key)?;
        let data = fs::read(&path)
            .await
            .map_err(|e| storage_error("read", key, e))?;
        debug!(key = %key, size = data.len(), "Read blob");
        Ok(Bytes::from(data))
    }

    async fn put(&self, key: &str, data: Bytes) -> AppResult<String> {
        let path = self.path_for(key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("create {}: {e}", parent.display())))?;
        }

        // Write next to the target and rename so readers never see a partial object
        let mut tmp = path.clone().into_os_string();
        tmp.push(".partial");
        fs::write(&tmp, &data)
            .await
            .map_err(|e| AppError::Storage(format!("write {key}: {e}")))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| AppError::Storage(format!("rename {key}: {e}")))?;

        info!(key = %key, size = data.len(), "Stored blob");
        Ok(path.display().to_string())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.path_for(key)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| storage_error("delete", key, e))?;
        info!(key = %key, "Deleted blob");
        Ok(())
    }
}

/// Blob store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> AppResult<Bytes> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("No such key: {key}")))
    }

    async fn put(&self, key: &str, data: Bytes) -> AppResult<String> {
        validate_blob_key(key)?;
        self.objects.write().await.insert(key.to_string(), data);
        Ok(format!("memory://{key}"))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.objects
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("No such key: {key}")))
    }
}
