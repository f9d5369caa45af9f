//! Server assembly and lifecycle
//!
//! [`build_state`] wires storage, the index and the upstream client from a
//! [`Config`]; [`build_app`] turns that state into the axum application; the
//! `run_*` functions bind a listener and serve until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::DefaultBodyLimit, Router};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::error::AppResult;
use crate::index::MetadataStore;
use crate::router;
use crate::state::AppState;
use crate::storage::{BlobStore, LocalBlobStore};
use crate::upstream::UpstreamClient;

/// Create the data directory, load the index and connect the upstream client.
pub async fn build_state(config: Config) -> AppResult<AppState> {
    let data_dir = config.storage.default_data_dir.clone();
    tokio::fs::create_dir_all(&data_dir).await?;
    info!(data_dir = %data_dir.display(), "Using data directory");

    let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(data_dir));
    let index = MetadataStore::load(blobs.clone(), config.storage.index_key.clone()).await?;
    let upstream = UpstreamClient::new(
        config
            .upstream
            .client_config(config.max_upload_size_bytes()),
    )?;

    Ok(AppState::new(
        config,
        Arc::new(index),
        blobs,
        Arc::new(upstream),
    ))
}

/// The complete application: routes, request tracing and the upload limit.
pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.max_upload_size_bytes();
    router::routes()
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Run the server with optional graceful shutdown
pub async fn run_server_with_shutdown(
    config: Config,
    shutdown_receiver: Option<oneshot::Receiver<()>>,
) -> Result<()> {
    let host = config.server.default_host.clone();
    let port = config.server.default_port;
    let scheme = config.server.scheme.clone();
    info!(host = %host, port = port, upstream = %config.upstream.url, "Starting gemgate");

    let state = build_state(config)
        .await
        .context("Failed to initialize server state")?;
    let app = build_app(state);

    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .map_err(|e| {
            error!(host = %host, port = port, error = %e, "Failed to bind to address");
            anyhow::anyhow!("Failed to bind to {}:{}: {}", host, port, e)
        })?;

    let addr = listener.local_addr()?;
    info!(addr = %addr, "Server listening");
    println!("✅ gemgate is running on {}", listen_url(&scheme, addr));

    match shutdown_receiver {
        Some(shutdown_rx) => {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                    info!("Received shutdown signal, stopping gracefully");
                })
                .await
                .context("Server error")?;
        }
        None => {
            axum::serve(listener, app)
                .with_graceful_shutdown(ctrl_c())
                .await
                .context("Server error")?;
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Run the server until Ctrl-C.
pub async fn run_server(config: Config) -> Result<()> {
    run_server_with_shutdown(config, None).await
}

fn listen_url(scheme: &str, addr: SocketAddr) -> String {
    format!("{scheme}://{addr}")
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
        return;
    }
    info!("Received Ctrl-C, stopping gracefully");
}
