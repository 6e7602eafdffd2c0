//! Error types for the ingestion service

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Service errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or invalid input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unsupported file type
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// File exceeds the configured size limit
    #[error("File too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },

    /// Missing or unknown credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Internal scope required
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found or not visible to this tenant
    #[error("Not found: {0}")]
    NotFound(String),

    /// Tenant exceeded its admission rate
    #[error("Rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Text extraction failure; `transient` decides whether the job retries
    #[error("Extraction failed: {message}")]
    Extraction { message: String, transient: bool },

    /// Embedding backend failure
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Embedder produced a vector that does not match the index dimension
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Vector index failure
    #[error("Vector index error: {0}")]
    VectorIndex(String),

    /// Metadata store failure
    #[error("Database error: {0}")]
    Database(String),

    /// Blob store failure
    #[error("Blob store error: {0}")]
    Blob(String),

    /// A result crossed a tenant boundary; aborts the request, never filtered
    #[error("Tenant isolation violation: {0}")]
    IsolationViolation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create a database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Create a blob store error
    pub fn blob(message: impl Into<String>) -> Self {
        Self::Blob(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether a pipeline job hitting this error should be retried with
    /// backoff. Everything else dead-letters on first occurrence.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Extraction { transient, .. } => *transient,
            Self::Embedding(_)
            | Self::VectorIndex(_)
            | Self::Database(_)
            | Self::Blob(_)
            | Self::Io(_)
            | Self::Http(_)
            | Self::Internal(_) => true,
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            Error::Config(msg) => (StatusCode::BAD_REQUEST, "config_error", msg.clone()),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            Error::UnsupportedFileType(ext) => (
                StatusCode::BAD_REQUEST,
                "unsupported_type",
                format!("Unsupported file type: {}", ext),
            ),
            Error::FileTooLarge { size, limit } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "file_too_large",
                format!("File size {} exceeds maximum of {} bytes", size, limit),
            ),
            Error::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            Error::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            Error::RateLimited { retry_after_ms } => {
                let retry_secs = retry_after_ms.div_ceil(1000).max(1);
                let body = Json(json!({
                    "error": {
                        "type": "rate_limited",
                        "message": format!("Rate limit exceeded, retry after {}s", retry_secs),
                    }
                }));
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, retry_secs.to_string())],
                    body,
                )
                    .into_response();
            }
            Error::Extraction { message, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "extraction_error",
                message.clone(),
            ),
            Error::Embedding(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "embedding_error", msg.clone())
            }
            Error::DimensionMismatch { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "dimension_mismatch",
                self.to_string(),
            ),
            Error::VectorIndex(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "vector_index_error", msg.clone())
            }
            Error::Database(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", msg.clone())
            }
            Error::Blob(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "blob_error", msg.clone()),
            Error::IsolationViolation(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "isolation_violation",
                msg.clone(),
            ),
            Error::Io(err) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error", err.to_string()),
            Error::Json(err) => (StatusCode::BAD_REQUEST, "json_error", err.to_string()),
            Error::Http(err) => (StatusCode::SERVICE_UNAVAILABLE, "http_error", err.to_string()),
            Error::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone())
            }
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::Embedding("connection reset".into()).is_transient());
        assert!(Error::Database("locked".into()).is_transient());
        assert!(Error::Extraction {
            message: "decoder timeout".into(),
            transient: true
        }
        .is_transient());

        assert!(!Error::Extraction {
            message: "corrupt file".into(),
            transient: false
        }
        .is_transient());
        assert!(!Error::DimensionMismatch {
            expected: 384,
            actual: 768
        }
        .is_transient());
        assert!(!Error::Validation("bad input".into()).is_transient());
    }
}
