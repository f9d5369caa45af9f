//! # Application State
//!
//! [`AppState`] bundles the shared resources every handler needs. It is built
//! once at startup and handed to the router wrapped in an `Arc`.
//!
//! ```rust,no_run
//! # async fn build() -> gemgate_server::AppResult<()> {
//! use std::sync::Arc;
//! use gemgate_server::{AppState, Config, LocalBlobStore, MetadataStore, UpstreamClient};
//!
//! let config = Config::default();
//! let blobs = Arc::new(LocalBlobStore::new("./data"));
//! let index = MetadataStore::load(blobs.clone(), config.storage.index_key.clone()).await?;
//! let upstream = UpstreamClient::new(config.upstream.client_config(config.max_upload_size_bytes()))?;
//!
//! let state = AppState::new(config, Arc::new(index), blobs, Arc::new(upstream));
//! # Ok(())
//! # }
//! ```

use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::index::MetadataStore;
use crate::storage::BlobStore;
use crate::upstream::Upstream;

/// Shared state for request handlers.
///
/// The index and blob store usually share one backend: the index snapshot is
/// just another object in it.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Private gem index
    pub index: Arc<MetadataStore>,
    /// Raw `.gem` files
    pub blobs: Arc<dyn BlobStore>,
    /// Public registry used for merged queries and proxy fallback
    pub upstream: Arc<dyn Upstream>,
}

impl AppState {
    pub fn new(
        config: Config,
        index: Arc<MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            index,
            blobs,
            upstream,
        }
    }
}

/// Standardized success response.
///
/// Serializes to: `{"message": "Gem rack-2.0.1 yanked"}`
#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}
