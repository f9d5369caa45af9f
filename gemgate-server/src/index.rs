//! # Private gem index
//!
//! [`MetadataStore`] holds the metadata of every privately uploaded gem and
//! mirrors it to a single JSON document in the blob store. The document is
//! rewritten in full on each mutation.
//!
//! Several server instances may share one blob store, so every mutation first
//! re-reads the snapshot and merges entries written elsewhere before applying
//! its own change (refresh-before-write). There is no background refresh;
//! read-only queries see whatever the last refresh loaded.
//!
//! One async mutex serializes each public call end to end, reads included.

use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::storage::BlobStore;
use crate::types::GemMetadata;

pub struct MetadataStore {
    blobs: Arc<dyn BlobStore>,
    key: String,
    gems: Mutex<Vec<GemMetadata>>,
}

impl MetadataStore {
    /// Create a store backed by the snapshot at `key` and load it.
    ///
    /// A missing snapshot is an empty index; any other read or parse failure
    /// is returned.
    pub async fn load(blobs: Arc<dyn BlobStore>, key: impl Into<String>) -> AppResult<Self> {
        let store = Self {
            blobs,
            key: key.into(),
            gems: Mutex::new(Vec::new()),
        };
        {
            let mut gems = store.gems.lock().await;
            store.refresh_locked(&mut gems).await?;
            info!(key = %store.key, gems = gems.len(), "Loaded gem index");
        }
        Ok(store)
    }

    /// Add an entry. Fails with [`AppError::DuplicateEntry`] when the same
    /// name and version is already indexed, here or in the shared snapshot.
    pub async fn put(&self, entry: GemMetadata) -> AppResult<()> {
        let mut gems = self.gems.lock().await;
        self.refresh_locked(&mut gems).await?;

        if gems.iter().any(|g| g.same_version(&entry.name, &entry.number)) {
            return Err(AppError::DuplicateEntry {
                name: entry.name,
                number: entry.number,
            });
        }

        info!(gem = %entry, "Indexing gem");
        gems.push(entry);
        self.persist_locked(&gems).await
    }

    /// Remove the entry for `name` at version `number`.
    pub async fn delete(&self, name: &str, number: &str) -> AppResult<GemMetadata> {
        let mut gems = self.gems.lock().await;
        self.refresh_locked(&mut gems).await?;

        let position = gems
            .iter()
            .position(|g| g.same_version(name, number))
            .ok_or_else(|| AppError::NotFound(format!("gem {name}-{number} is not indexed")))?;
        let removed = gems.remove(position);

        info!(gem = %removed, "Removed gem from index");
        self.persist_locked(&gems).await?;
        Ok(removed)
    }

    /// Every indexed version of the named gems.
    pub async fn lookup<S: AsRef<str>>(&self, names: &[S]) -> Vec<GemMetadata> {
        let wanted: HashSet<&str> = names.iter().map(|n| n.as_ref()).collect();
        self.gems
            .lock()
            .await
            .iter()
            .filter(|g| wanted.contains(g.name.as_str()))
            .cloned()
            .collect()
    }

    pub async fn all_entries(&self) -> Vec<GemMetadata> {
        self.gems.lock().await.clone()
    }

    /// Merge entries written to the snapshot by other instances.
    pub async fn refresh(&self) -> AppResult<()> {
        let mut gems = self.gems.lock().await;
        self.refresh_locked(&mut gems).await
    }

    pub async fn len(&self) -> usize {
        self.gems.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.gems.lock().await.is_empty()
    }

    async fn refresh_locked(&self, gems: &mut Vec<GemMetadata>) -> AppResult<()> {
        let raw = match self.blobs.get(&self.key).await {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => {
                debug!(key = %self.key, "No index snapshot yet");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        // Parse everything before touching the in-memory list
        let stored: Vec<GemMetadata> = serde_json::from_slice(&raw)?;

        let mut merged = 0;
        for entry in stored {
            if gems.iter().any(|g| g.same_version(&entry.name, &entry.number)) {
                continue;
            }
            gems.push(entry);
            merged += 1;
        }
        if merged > 0 {
            debug!(key = %self.key, merged, "Merged entries from index snapshot");
        }
        Ok(())
    }

    async fn persist_locked(&self, gems: &[GemMetadata]) -> AppResult<()> {
        let mut document = serde_json::to_vec(gems)?;
        document.push(b'\n');

        if let Err(e) = self.blobs.put(&self.key, Bytes::from(document)).await {
            warn!(
                key = %self.key,
                error = %e,
                "Index snapshot not written; in-memory index is ahead of storage"
            );
            return Err(e);
        }
        debug!(key = %self.key, gems = gems.len(), "Wrote index snapshot");
        Ok(())
    }
}
