//! # Error Handling and Response Types
//!
//! This module defines the error taxonomy shared by every gemgate component and
//! how each error is rendered as an HTTP response.
//!
//! ## Error Response Format
//!
//! All API errors are returned in a consistent JSON format:
//!
//! ```json
//! {
//!   "error": "Human-readable error message",
//!   "code": "machine_readable_error_code",
//!   "details": {...},
//!   "timestamp": "2024-01-01T12:00:00Z"
//! }
//! ```
//!
//! ## Error Classifications
//!
//! - **Input errors** (400): malformed uploads, duplicate gems, bad parameters.
//!   Upstream dependency API failures are reported as 400 as well, since the
//!   client's query is what could not be answered.
//! - **Not Found** (404): missing blobs and index entries.
//! - **Proxy errors** (502): the upstream registry could not be reached while
//!   proxying.
//! - **Infrastructure errors** (500): storage and encoding failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::gem::GemError;
use crate::marshal::MarshalError;
use crate::validation::ValidationError;

/// Standardized error response structure for consistent API error handling
#[derive(Serialize, Debug)]
pub struct ApiErrorResponse {
    pub error: String,          // Human-readable error message
    pub code: String,           // Machine-readable error code
    pub details: Option<Value>, // Additional error details
    pub timestamp: String,      // ISO 8601 timestamp
}

/// Error code classification for machine-readable error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    MalformedInput,
    DuplicateEntry,
    NotFound,
    UpstreamError,
    PartialUpload,
    BadGateway,
    StorageError,
    EncodingError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::MalformedInput => "malformed_input",
            ErrorCode::DuplicateEntry => "duplicate_entry",
            ErrorCode::NotFound => "not_found",
            ErrorCode::UpstreamError => "upstream_error",
            ErrorCode::PartialUpload => "partial_upload",
            ErrorCode::BadGateway => "bad_gateway",
            ErrorCode::StorageError => "storage_error",
            ErrorCode::EncodingError => "encoding_error",
            ErrorCode::InternalError => "internal_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError
            | ErrorCode::MalformedInput
            | ErrorCode::DuplicateEntry
            | ErrorCode::UpstreamError
            | ErrorCode::PartialUpload => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::BadGateway => StatusCode::BAD_GATEWAY,
            ErrorCode::StorageError | ErrorCode::EncodingError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Application-specific error types with error codes
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("gem with same name and version already exists: {name}-{number}")]
    DuplicateEntry { name: String, number: String },

    #[error("malformed gem: {0}")]
    MalformedInput(#[from] GemError),

    #[error("{0}")]
    BadRequest(String),

    #[error("upstream dependency API failed: {0}")]
    Upstream(String),

    #[error("proxy to upstream registry failed: {0}")]
    ProxyFailed(String),

    /// The index already holds the entry but the raw gem could not be stored.
    #[error("gem {gem} was indexed but its upload failed: {reason}")]
    BlobUploadFailed { gem: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("encoding error: {0}")]
    Encoding(#[from] MarshalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Get the appropriate error code for this error type
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::DuplicateEntry { .. } => ErrorCode::DuplicateEntry,
            AppError::MalformedInput(_) => ErrorCode::MalformedInput,
            AppError::BadRequest(_) => ErrorCode::ValidationError,
            AppError::Upstream(_) => ErrorCode::UpstreamError,
            AppError::ProxyFailed(_) => ErrorCode::BadGateway,
            AppError::BlobUploadFailed { .. } => ErrorCode::PartialUpload,
            AppError::Storage(_) => ErrorCode::StorageError,
            AppError::Encoding(_) => ErrorCode::EncodingError,
            AppError::Io(_) | AppError::Json(_) | AppError::InternalError(_) => {
                ErrorCode::InternalError
            }
        }
    }

    /// True for the not-found class that callers may treat as a cache miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    /// Get additional error details if available
    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::DuplicateEntry { name, number } => {
                Some(json!({"name": name, "number": number}))
            }
            AppError::BlobUploadFailed { gem, .. } => Some(json!({"gem": gem, "indexed": true})),
            _ => None,
        }
    }

    /// Create a standardized error response
    pub fn to_error_response(&self) -> ApiErrorResponse {
        let code = self.error_code();
        ApiErrorResponse {
            error: self.to_string(),
            code: code.as_str().to_string(),
            details: self.details(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = code.http_status();

        if status.is_server_error() {
            tracing::error!(error = %self, code = code.as_str(), "Request failed");
        } else {
            tracing::warn!(error = %self, code = code.as_str(), "Request rejected");
        }

        let error_response = self.to_error_response();
        tracing::debug!(status = %status, code = %error_response.code, "Returning standardized error response");

        (status, axum::Json(error_response)).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// Convenient result type for application operations.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors_are_client_errors() {
        let duplicate = AppError::DuplicateEntry {
            name: "rack".to_string(),
            number: "2.0.1".to_string(),
        };
        assert_eq!(duplicate.error_code().http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::MalformedInput(GemError::MetadataNotFound)
                .error_code()
                .http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Upstream("timeout".to_string())
                .error_code()
                .http_status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_infrastructure_errors_are_server_errors() {
        assert_eq!(
            AppError::Storage("disk full".to_string())
                .error_code()
                .http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Encoding(MarshalError::UnclosedCollection { depth: 1 })
                .error_code()
                .http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::ProxyFailed("refused".to_string())
                .error_code()
                .http_status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_error_response_body() {
        let err = AppError::BlobUploadFailed {
            gem: "foo-1.2.3".to_string(),
            reason: "bucket unavailable".to_string(),
        };
        let response = err.to_error_response();
        assert_eq!(response.code, "partial_upload");
        assert!(response.error.contains("foo-1.2.3"));
        assert_eq!(response.details.unwrap()["indexed"], true);
        assert!(AppError::NotFound("x".to_string()).is_not_found());
    }
}
