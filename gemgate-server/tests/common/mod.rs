//! Common test utilities and helpers
//!
//! Builds the full application around an in-memory blob store and a fake
//! upstream registry that records how often it was called.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, extract::Request, response::Response};
use axum_test::TestServer;
use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use gemgate_server::{
    build_app, AppError, AppResult, AppState, BlobStore, Config, Dependency, GemMetadata,
    MemoryBlobStore, MetadataStore, Upstream,
};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const INDEX_KEY: &str = "api/v1/dependencies.json";

/// Upstream registry stand-in.
#[derive(Default)]
pub struct FakeUpstream {
    pub records: Vec<GemMetadata>,
    pub fail_dependencies: bool,
    pub dependency_calls: AtomicUsize,
    pub forward_calls: AtomicUsize,
    pub last_query: Mutex<Option<String>>,
}

impl FakeUpstream {
    pub fn with_records(records: Vec<GemMetadata>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_dependencies: true,
            ..Default::default()
        }
    }

    pub fn forwarded(&self) -> usize {
        self.forward_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn fetch_dependencies(&self, query: Option<&str>) -> AppResult<Vec<GemMetadata>> {
        self.dependency_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = query.map(str::to_string);
        if self.fail_dependencies {
            return Err(AppError::Upstream("connection refused".to_string()));
        }
        Ok(self.records.clone())
    }

    async fn forward(&self, request: Request) -> AppResult<Response> {
        self.forward_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Response::builder()
            .status(200)
            .header("x-upstream", "hit")
            .body(Body::from(format!("upstream:{}", request.uri().path())))
            .unwrap())
    }

    fn base_url(&self) -> &str {
        "https://upstream.test/"
    }
}

/// Blob store that refuses to store gem files but keeps the index working.
#[derive(Default)]
pub struct NoGemStore {
    inner: MemoryBlobStore,
}

#[async_trait]
impl BlobStore for NoGemStore {
    async fn get(&self, key: &str) -> AppResult<Bytes> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> AppResult<String> {
        if key.starts_with("gems/") {
            return Err(AppError::Storage("bucket unavailable".to_string()));
        }
        self.inner.put(key, data).await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.inner.delete(key).await
    }
}

/// Blob store whose disk fails on every gem read.
#[derive(Default)]
pub struct BrokenReadStore {
    inner: MemoryBlobStore,
}

#[async_trait]
impl BlobStore for BrokenReadStore {
    async fn get(&self, key: &str) -> AppResult<Bytes> {
        if key.starts_with("gems/") {
            return Err(AppError::Storage(format!("read {key}: input/output error")));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> AppResult<String> {
        self.inner.put(key, data).await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.inner.delete(key).await
    }
}

pub struct TestSetup {
    pub server: TestServer,
    pub state: AppState,
    pub upstream: Arc<FakeUpstream>,
}

pub async fn create_test_setup() -> TestSetup {
    create_test_setup_with(FakeUpstream::default(), Arc::new(MemoryBlobStore::new())).await
}

pub async fn create_test_setup_with(
    upstream: FakeUpstream,
    blobs: Arc<dyn BlobStore>,
) -> TestSetup {
    let upstream = Arc::new(upstream);
    let index = MetadataStore::load(blobs.clone(), INDEX_KEY)
        .await
        .expect("Failed to load index");
    let state = AppState::new(Config::default(), Arc::new(index), blobs, upstream.clone());

    let server = TestServer::new(build_app(state.clone())).expect("Failed to create test server");
    TestSetup {
        server,
        state,
        upstream,
    }
}

pub fn metadata(name: &str, number: &str, deps: &[(&str, &str)]) -> GemMetadata {
    GemMetadata {
        name: name.to_string(),
        number: number.to_string(),
        platform: "ruby".to_string(),
        dependencies: deps.iter().map(|(n, r)| Dependency::new(*n, *r)).collect(),
    }
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn append(builder: &mut tar::Builder<Vec<u8>>, path: &str, contents: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_path(path).unwrap();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, contents).unwrap();
}

/// Build a `.gem` archive whose specification declares `runtime` dependencies
/// as `(name, operator, version)` plus one development dependency.
pub fn gem_archive(name: &str, version: &str, runtime: &[(&str, &str, &str)]) -> Bytes {
    let mut spec = format!(
        "--- !ruby/object:Gem::Specification\n\
         name: {name}\n\
         version: !ruby/object:Gem::Version\n  version: {version}\n\
         platform: ruby\n\
         authors:\n- Test Author\n\
         dependencies:\n"
    );
    let development = [("rspec", ">=", "3.0")];
    let entries = runtime
        .iter()
        .map(|d| (d, ":runtime"))
        .chain(development.iter().map(|d| (d, ":development")));
    for ((dep, op, req), kind) in entries {
        spec.push_str(&format!(
            "- !ruby/object:Gem::Dependency\n  name: {dep}\n  requirement: !ruby/object:Gem::Requirement\n    requirements:\n    - - \"{op}\"\n      - !ruby/object:Gem::Version\n        version: '{req}'\n  type: {kind}\n  prerelease: false\n"
        ));
    }

    let mut builder = tar::Builder::new(Vec::new());
    append(&mut builder, "metadata.gz", &gzip(spec.as_bytes()));
    append(&mut builder, "data.tar.gz", &gzip(b"lib/placeholder.rb"));
    append(&mut builder, "checksums.yaml.gz", &gzip(b"---\n"));
    Bytes::from(builder.into_inner().unwrap())
}
