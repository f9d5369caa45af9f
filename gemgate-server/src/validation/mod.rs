//! # Input Validation
//!
//! Checks applied to anything that ends up in a blob store key: the key
//! itself, and the gem name and version it is derived from. Local storage maps
//! keys onto the filesystem, so these checks are what keeps an upload or a
//! fetch inside the data directory.

pub mod error;
pub mod limits;
pub mod manifests;
pub mod paths;

pub use self::{
    error::{ValidationError, ValidationResult},
    limits::{
        validate_file_size, MAX_BLOB_KEY_DEPTH, MAX_GEM_NAME_LENGTH, MAX_METADATA_ENTRY_SIZE,
        MAX_METADATA_SIZE,
        MAX_UPLOAD_SIZE, MAX_VERSION_LENGTH,
    },
    manifests::{validate_gem_name, validate_version},
    paths::validate_blob_key,
};
