//! # Input Validation: Blob Keys
//!
//! Blob keys are `/`-separated relative paths such as `gems/rack-2.0.1.gem`.
//! The local blob store joins them onto its root directory, so a key must never
//! be able to name anything outside that root.

use crate::validation::error::{ValidationError, ValidationResult};
use crate::validation::limits::MAX_BLOB_KEY_DEPTH;
use std::path::{Component, Path};

const DANGEROUS_PATTERNS: [&str; 17] = [
    "//", "\\", "~", "$", "`", "|", "&", ";", "<", ">", "(", ")", "{", "}", "*", "?", "%",
];

/// Validate that a blob key is a safe relative path.
///
/// ```rust
/// use gemgate_server::validation::validate_blob_key;
///
/// assert!(validate_blob_key("gems/rack-2.0.1.gem").is_ok());
/// assert!(validate_blob_key("../../etc/passwd").is_err());
/// assert!(validate_blob_key("/etc/passwd").is_err());
/// ```
pub fn validate_blob_key(key: &str) -> ValidationResult<&str> {
    if key.is_empty() {
        return Err(ValidationError::TooShort { actual: 0, min: 1 });
    }

    if key.contains('\0') {
        return Err(ValidationError::NullBytes);
    }

    if key.chars().any(|c| c.is_control()) {
        return Err(ValidationError::ControlCharacters);
    }

    let path = Path::new(key);
    if path.is_absolute() || key.starts_with('/') {
        return Err(ValidationError::AbsolutePath {
            path: key.to_string(),
        });
    }

    if key.contains("..")
        || key
            .split('/')
            .any(|segment| segment.is_empty() || segment == ".")
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(ValidationError::PathTraversal {
            path: key.to_string(),
        });
    }

    let depth = path.components().count();
    if depth > MAX_BLOB_KEY_DEPTH {
        return Err(ValidationError::PathTooDeep {
            actual: depth,
            max: MAX_BLOB_KEY_DEPTH,
        });
    }

    if DANGEROUS_PATTERNS.iter().any(|p| key.contains(p)) {
        return Err(ValidationError::InvalidCharacters {
            input: key.to_string(),
        });
    }

    Ok(key)
}
