//! HTTP routes
//!
//! | Route | Behavior |
//! |---|---|
//! | `GET /api/v1/dependencies` | upstream records plus the whole private index, Marshal encoded |
//! | `GET /private/api/v1/dependencies` | private index only, Marshal encoded |
//! | `POST /private/api/v1/gems` | upload a `.gem` |
//! | `GET /private/api/v1/gems` | list the private index as JSON |
//! | `DELETE /private/api/v1/gems/yank` | remove a version from the index and storage |
//! | `GET /gems/{*path}` | serve from storage, proxy upstream on a miss |
//! | `GET /private/gems/{*path}` | serve from storage, 404 on a miss |
//! | anything else | proxied upstream, except `/` and `/private/...` |
//!
//! Nothing under `/private` is ever sent upstream.

use axum::{
    body::Bytes,
    extract::{Path, Query, RawQuery, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::gem::Gem;
use crate::marshal::encode_dependencies;
use crate::state::{AppState, SuccessResponse};
use crate::types::GemMetadata;
use crate::validation;

/// Path prefix of routes that are never proxied.
pub const PRIVATE_PREFIX: &str = "/private";

const OCTET_STREAM: &str = "application/octet-stream";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/api/v1/dependencies", get(merged_dependencies))
        .route("/private/api/v1/dependencies", get(private_dependencies))
        .route("/private/api/v1/gems", get(list_gems).post(upload_gem))
        .route("/private/api/v1/gems/yank", delete(yank_gem))
        .route("/gems/{*path}", get(fetch_gem))
        .route("/private/gems/{*path}", get(fetch_private_gem))
        .fallback(fallback)
}

/// True for `/private` and everything below it.
pub fn is_private_path(path: &str) -> bool {
    path == PRIVATE_PREFIX
        || path
            .strip_prefix(PRIVATE_PREFIX)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn marshal_response(records: &[GemMetadata]) -> AppResult<Response> {
    let body = encode_dependencies(records)?;
    Ok(([(header::CONTENT_TYPE, OCTET_STREAM)], body).into_response())
}

fn gem_file_response(data: Bytes) -> Response {
    ([(header::CONTENT_TYPE, OCTET_STREAM)], data).into_response()
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}

async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "gemgate",
        "version": env!("CARGO_PKG_VERSION"),
        "private_gems": state.index.len().await,
        "upstream": state.upstream.base_url(),
    }))
}

/// Bundler's dependency API: upstream results with every private gem appended.
async fn merged_dependencies(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> AppResult<Response> {
    let mut records = state.upstream.fetch_dependencies(query.as_deref()).await?;
    let private = state.index.all_entries().await;
    debug!(
        upstream = records.len(),
        private = private.len(),
        "Merging dependency records"
    );
    records.extend(private);
    marshal_response(&records)
}

#[derive(Deserialize)]
struct DependencyQuery {
    #[serde(default)]
    gems: String,
}

fn split_gem_names(gems: &str) -> Vec<String> {
    gems.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

async fn private_dependencies(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DependencyQuery>,
) -> AppResult<Response> {
    let names = split_gem_names(&params.gems);
    let records = state.index.lookup(&names).await;
    debug!(requested = names.len(), found = records.len(), "Private dependency query");
    marshal_response(&records)
}

async fn list_gems(State(state): State<Arc<AppState>>) -> Json<Vec<GemMetadata>> {
    Json(state.index.all_entries().await)
}

async fn upload_gem(State(state): State<Arc<AppState>>, body: Bytes) -> AppResult<Response> {
    validation::validate_file_size(
        body.len() as u64,
        Some(state.config.max_upload_size_bytes() as u64),
    )?;

    // Archive decoding is CPU bound
    let gem = tokio::task::spawn_blocking(move || Gem::load(body))
        .await
        .map_err(|e| AppError::InternalError(format!("Gem decoding task failed: {e}")))??;
    let metadata = gem.metadata.clone();

    state.index.put(metadata.clone()).await?;

    let key = gem.blob_key();
    let location = match state.blobs.put(&key, gem.raw().clone()).await {
        Ok(location) => location,
        Err(e) => {
            error!(
                gem = %metadata,
                key = %key,
                error = %e,
                "Gem is indexed but its file was not stored"
            );
            return Err(AppError::BlobUploadFailed {
                gem: metadata.to_string(),
                reason: e.to_string(),
            });
        }
    };

    info!(gem = %metadata, location = %location, "Gem uploaded");
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location.clone())],
        Json(json!({
            "message": format!("Gem {metadata} uploaded"),
            "location": location,
            "gem": metadata,
        })),
    )
        .into_response())
}

#[derive(Deserialize)]
struct YankParams {
    gem_name: String,
    version: String,
}

async fn yank_gem(
    State(state): State<Arc<AppState>>,
    Query(params): Query<YankParams>,
) -> AppResult<Json<SuccessResponse>> {
    let removed = state.index.delete(&params.gem_name, &params.version).await?;

    let key = removed.blob_key();
    match state.blobs.delete(&key).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {
            warn!(gem = %removed, key = %key, "Yanked gem had no stored file");
        }
        Err(e) => {
            error!(
                gem = %removed,
                key = %key,
                error = %e,
                "Gem removed from index but its file could not be deleted"
            );
            return Err(e);
        }
    }

    info!(gem = %removed, "Gem yanked");
    Ok(Json(SuccessResponse {
        message: format!("Gem {removed} yanked"),
    }))
}

/// Serve a stored gem, falling back to the upstream registry.
async fn fetch_gem(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    request: Request,
) -> AppResult<Response> {
    let key = format!("gems/{path}");
    if let Err(e) = validation::validate_blob_key(&key) {
        // Never stored locally, so upstream is the only place it can be
        debug!(key = %key, error = %e, "Not a storable key, proxying upstream");
        return state.upstream.forward(request).await;
    }
    match state.blobs.get(&key).await {
        Ok(data) => {
            debug!(key = %key, "Serving stored gem");
            Ok(gem_file_response(data))
        }
        Err(e) if e.is_not_found() => {
            debug!(key = %key, "Gem not stored locally, proxying upstream");
            state.upstream.forward(request).await
        }
        Err(e) => Err(e),
    }
}

async fn fetch_private_gem(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> AppResult<Response> {
    let key = format!("gems/{path}");
    if validation::validate_blob_key(&key).is_err() {
        return Err(AppError::NotFound(format!("No such key: {key}")));
    }
    let data = state.blobs.get(&key).await?;
    Ok(gem_file_response(data))
}

async fn fallback(State(state): State<Arc<AppState>>, request: Request) -> AppResult<Response> {
    let path = request.uri().path();
    if path == "/" || is_private_path(path) {
        return Err(AppError::NotFound(format!("No route for {path}")));
    }
    state.upstream.forward(request).await
}
