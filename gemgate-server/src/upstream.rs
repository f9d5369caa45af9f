//! Upstream registry access
//!
//! gemgate talks to the public registry (rubygems.org by default) in two ways:
//!
//! - the JSON dependency API, whose records are merged with the private index
//!   for `GET /api/v1/dependencies`
//! - a transparent reverse proxy for everything gemgate does not serve itself
//!
//! Both sit behind the [`Upstream`] trait so the router can be tested without
//! a network.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderName},
    response::Response,
};
use futures_util::TryStreamExt;
use reqwest::{redirect, Client};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AppError, AppResult};
use crate::types::GemMetadata;
use crate::validation::MAX_UPLOAD_SIZE;

/// Path of the JSON dependency API on the upstream registry.
pub const DEPENDENCIES_PATH: &str = "/api/v1/dependencies.json";

// Connection-scoped headers that must not be forwarded by a proxy.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[async_trait]
pub trait Upstream: Send + Sync {
    /// Query the upstream dependency API, forwarding `query` verbatim.
    ///
    /// Transport failures, non-success statuses and undecodable bodies are all
    /// [`AppError::Upstream`].
    async fn fetch_dependencies(&self, query: Option<&str>) -> AppResult<Vec<GemMetadata>>;

    /// Replay `request` against the upstream registry and stream its response
    /// back unchanged.
    async fn forward(&self, request: Request) -> AppResult<Response>;

    /// Base URL requests are sent to.
    fn base_url(&self) -> &str;
}

/// Connection settings for the upstream registry.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL, e.g. `https://api.rubygems.org`
    pub url: String,
    /// Request timeout for dependency API calls; proxied transfers only use
    /// it as a connect timeout
    pub timeout: Duration,
    /// User agent sent on dependency API calls
    pub user_agent: String,
    /// Largest request body the proxy will buffer and forward
    pub max_body_size: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "https://api.rubygems.org".to_string(),
            timeout: Duration::from_secs(30),
            user_agent: format!("gemgate/{}", env!("CARGO_PKG_VERSION")),
            max_body_size: MAX_UPLOAD_SIZE as usize,
        }
    }
}

/// reqwest implementation of [`Upstream`].
///
/// Uses two clients: the API client identifies itself with the configured user
/// agent, while the proxy client sends no default headers so that proxied
/// requests carry exactly what the original caller sent. The proxy client does
/// not follow redirects; they are returned to the caller.
///
/// Neither client caches responses.
pub struct UpstreamClient {
    api: Client,
    proxy: Client,
    base: Url,
    max_body_size: usize,
}

impl UpstreamClient {
    /// Build both HTTP clients.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::BadRequest`] when the configured URL cannot be
    /// parsed, or an internal error if a client cannot be created.
    pub fn new(config: UpstreamConfig) -> AppResult<Self> {
        let base = Url::parse(config.url.trim_end_matches('/')).map_err(|e| {
            AppError::BadRequest(format!("Invalid upstream URL '{}': {e}", config.url))
        })?;

        let api = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to create HTTP client: {e}")))?;
        let proxy = Client::builder()
            .connect_timeout(config.timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to create proxy client: {e}")))?;

        info!(upstream = %base, "Configured upstream registry");
        Ok(Self {
            api,
            proxy,
            base,
            max_body_size: config.max_body_size,
        })
    }

    fn target(&self, path_and_query: &str) -> String {
        format!(
            "{}{}",
            self.base.as_str().trim_end_matches('/'),
            path_and_query
        )
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

#[async_trait]
impl Upstream for UpstreamClient {
    async fn fetch_dependencies(&self, query: Option<&str>) -> AppResult<Vec<GemMetadata>> {
        let mut url = Url::parse(&self.target(DEPENDENCIES_PATH))
            .map_err(|e| AppError::InternalError(format!("Invalid dependency API URL: {e}")))?;
        url.set_query(query.filter(|q| !q.is_empty()));
        debug!(url = %url, "Fetching upstream dependencies");

        let response = self.api.get(url.clone()).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Upstream dependency API unreachable");
            AppError::Upstream(format!("request to {url} failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "Upstream dependency API returned an error");
            return Err(AppError::Upstream(format!("{url} returned {status}")));
        }

        let records: Vec<GemMetadata> = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("invalid response from {url}: {e}")))?;
        debug!(url = %url, records = records.len(), "Fetched upstream dependencies");
        Ok(records)
    }

    async fn forward(&self, request: Request) -> AppResult<Response> {
        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");
        let target = self.target(path_and_query);

        let mut headers = parts.headers;
        headers.remove(header::HOST);
        strip_hop_by_hop(&mut headers);

        let body = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read request body: {e}")))?;

        debug!(method = %parts.method, target = %target, "Proxying request upstream");
        let upstream = self
            .proxy
            .request(parts.method, &target)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                warn!(target = %target, error = %e, "Proxy request failed");
                AppError::ProxyFailed(format!("{target}: {e}"))
            })?;

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        strip_hop_by_hop(&mut response_headers);

        let log_target = target.clone();
        let stream = upstream.bytes_stream().inspect_err(move |e| {
            warn!(target = %log_target, error = %e, "Proxied response body interrupted");
        });

        let mut response = Response::new(Body::from_stream(stream));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        debug!(target = %target, status = %status, "Proxied response");
        Ok(response)
    }

    fn base_url(&self) -> &str {
        self.base.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use mockito::Matcher;

    fn client_for(url: &str) -> UpstreamClient {
        UpstreamClient::new(UpstreamConfig {
            url: url.to_string(),
            timeout: Duration::from_secs(5),
            user_agent: "gemgate-test".to_string(),
            max_body_size: 1024,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_dependencies() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", DEPENDENCIES_PATH)
            .match_query(Matcher::UrlEncoded("gems".into(), "rack,sinatra".into()))
            .match_header("user-agent", "gemgate-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"name":"rack","number":"2.0.1","platform":"ruby","dependencies":[]},
                    {"name":"sinatra","number":"2.0.0","platform":"ruby","dependencies":[["rack","~> 2.0"]]}]"#,
            )
            .create_async()
            .await;

        let client = client_for(&server.url());
        let records = client
            .fetch_dependencies(Some("gems=rack,sinatra"))
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].dependencies[0].requirement(), "~> 2.0");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_dependencies_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", DEPENDENCIES_PATH)
            .with_status(500)
            .create_async()
            .await;

        let err = client_for(&server.url())
            .fetch_dependencies(None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_fetch_dependencies_bad_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", DEPENDENCIES_PATH)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let err = client_for(&server.url())
            .fetch_dependencies(Some("gems=rack"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_fetch_dependencies_unreachable() {
        // Nothing listens on the discard port
        let err = client_for("http://127.0.0.1:9")
            .fetch_dependencies(Some("gems=rack"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_forward_streams_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/gems/rack-2.0.1.gem")
            .match_header("x-request-id", "abc")
            .match_header("user-agent", Matcher::Missing)
            .with_status(200)
            .with_header("content-type", "application/octet-stream")
            .with_header("etag", "\"v1\"")
            .with_body("gem payload")
            .create_async()
            .await;

        let request = Request::builder()
            .uri("/gems/rack-2.0.1.gem")
            .header("host", "gems.internal")
            .header("x-request-id", "abc")
            .header("connection", "keep-alive")
            .body(Body::empty())
            .unwrap();

        let response = client_for(&server.url()).forward(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["etag"], "\"v1\"");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body.as_ref(), b"gem payload");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_forward_keeps_status_and_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/versions")
            .match_query(Matcher::UrlEncoded("since".into(), "2024".into()))
            .with_status(302)
            .with_header("location", "https://cdn.example/versions")
            .create_async()
            .await;

        let request = Request::builder()
            .uri("/versions?since=2024")
            .header("user-agent", "bundler/2.4")
            .body(Body::empty())
            .unwrap();

        let response = client_for(&server.url()).forward(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()["location"],
            "https://cdn.example/versions"
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_forward_unreachable_is_bad_gateway() {
        let request = Request::builder()
            .uri("/gems/rack-2.0.1.gem")
            .body(Body::empty())
            .unwrap();
        let err = client_for("http://127.0.0.1:9")
            .forward(request)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ProxyFailed(_)), "{err:?}");
        assert_eq!(err.error_code().http_status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_forward_body_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/gems")
            .match_body("small body")
            .with_status(200)
            .create_async()
            .await;
        let client = client_for(&server.url());

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/gems")
            .body(Body::from("small body"))
            .unwrap();
        let response = client.forward(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/gems")
            .body(Body::from(vec![b'x'; 2048]))
            .unwrap();
        let err = client.forward(request).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)), "{err:?}");
        // Only the first request reached upstream
        mock.assert_async().await;
    }

    #[test]
    fn test_invalid_base_url() {
        let result = UpstreamClient::new(UpstreamConfig {
            url: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
