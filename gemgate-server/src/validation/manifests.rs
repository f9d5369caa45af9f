//! # Input Validation: Gem Names and Versions
//!
//! Names and versions read from an uploaded gem specification end up in the
//! blob key `gems/{name}-{version}.gem`, so they are restricted to the
//! characters RubyGems itself accepts.

use crate::validation::error::{ValidationError, ValidationResult};
use crate::validation::limits::{MAX_GEM_NAME_LENGTH, MAX_VERSION_LENGTH};

/// Validate a gem name: letters, digits, `.`, `-` and `_`, starting with a
/// letter, digit or underscore.
pub fn validate_gem_name(name: &str) -> ValidationResult<&str> {
    if name.is_empty() {
        return Err(ValidationError::TooShort { actual: 0, min: 1 });
    }

    if name.len() > MAX_GEM_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            actual: name.len(),
            max: MAX_GEM_NAME_LENGTH,
        });
    }

    if name.contains('\0') {
        return Err(ValidationError::NullBytes);
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(ValidationError::ControlCharacters);
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(ValidationError::InvalidCharacters {
            input: name.to_string(),
        });
    }

    if name.starts_with('.') || name.starts_with('-') {
        return Err(ValidationError::InvalidFormat {
            reason: "gem names cannot start with . or -".to_string(),
        });
    }

    Ok(name)
}

/// Validate a gem version string.
///
/// Versions stay opaque; this only rules out characters that have no place in
/// a file name.
pub fn validate_version(version: &str) -> ValidationResult<&str> {
    if version.is_empty() {
        return Err(ValidationError::TooShort { actual: 0, min: 1 });
    }

    if version.len() > MAX_VERSION_LENGTH {
        return Err(ValidationError::TooLong {
            actual: version.len(),
            max: MAX_VERSION_LENGTH,
        });
    }

    if version.contains('\0') {
        return Err(ValidationError::NullBytes);
    }

    if version.chars().any(|c| c.is_control()) {
        return Err(ValidationError::ControlCharacters);
    }

    if !version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+'))
    {
        return Err(ValidationError::InvalidCharacters {
            input: version.to_string(),
        });
    }

    if version.starts_with('.') {
        return Err(ValidationError::InvalidFormat {
            reason: "versions cannot start with .".to_string(),
        });
    }

    Ok(version)
}
