//! # Input Validation: Size Limits
//!
//! Limits that keep a single upload or archive entry from exhausting memory.

use crate::validation::error::{ValidationError, ValidationResult};

/// Maximum allowed gem upload size (100 MB), used when the configuration
/// does not override it
pub const MAX_UPLOAD_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum decompressed size of a gem's `metadata.gz` (1 MB)
pub const MAX_METADATA_SIZE: usize = 1024 * 1024;

/// Maximum compressed size of a gem's `metadata.gz` entry (1 MB)
pub const MAX_METADATA_ENTRY_SIZE: usize = 1024 * 1024;

/// Maximum allowed gem name length
pub const MAX_GEM_NAME_LENGTH: usize = 214;

/// Maximum allowed version string length
pub const MAX_VERSION_LENGTH: usize = 64;

/// Maximum number of path segments in a blob key
pub const MAX_BLOB_KEY_DEPTH: usize = 10;

/// Validate a size against a limit (defaults to [`MAX_UPLOAD_SIZE`]).
pub fn validate_file_size(size: u64, max_size: Option<u64>) -> ValidationResult<()> {
    let limit = max_size.unwrap_or(MAX_UPLOAD_SIZE);

    if size > limit {
        return Err(ValidationError::FileTooLarge {
            actual: size,
            max: limit,
        });
    }

    Ok(())
}
