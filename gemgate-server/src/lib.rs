//! # gemgate
//!
//! A private gem registry that sits in front of a public one. Bundler and
//! `gem` talk to gemgate as if it were rubygems.org:
//!
//! - private gems are uploaded to gemgate and stored in its blob store
//! - dependency queries return the public registry's answer with the private
//!   index merged in, encoded in Ruby's Marshal format
//! - gem downloads are served locally when stored and proxied upstream
//!   otherwise
//! - everything else is proxied to the public registry unchanged
//!
//! ## Key Modules
//!
//! - [`gem`]: reads the specification out of an uploaded `.gem`
//! - [`index`]: the private gem index and its JSON snapshot
//! - [`marshal`]: Ruby Marshal encoding of dependency responses
//! - [`router`]: HTTP routes and the serve/merge/proxy decisions
//! - [`storage`]: blob store backends
//! - [`upstream`]: public registry client and reverse proxy
//! - [`config`], [`error`], [`state`], [`server`], [`validation`]

pub mod config;
pub mod error;
pub mod gem;
pub mod index;
pub mod marshal;
pub mod router;
pub mod server;
pub mod state;
pub mod storage;
pub mod types;
pub mod upstream;
pub mod validation;

pub use config::Config;
pub use error::{ApiErrorResponse, AppError, AppResult, ErrorCode};
pub use gem::{Gem, GemError};
pub use index::MetadataStore;
pub use marshal::{encode_dependencies, write_dependencies, MarshalError, MarshalWriter};
pub use server::{build_app, build_state, run_server, run_server_with_shutdown};
pub use state::{AppState, SuccessResponse};
pub use storage::{BlobStore, LocalBlobStore, MemoryBlobStore};
pub use types::{Dependency, GemMetadata};
pub use upstream::{Upstream, UpstreamClient, UpstreamConfig};
pub use validation::{ValidationError, ValidationResult};
