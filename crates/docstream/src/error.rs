//! Error types for the ingestion pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::types::DocumentStatus;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Bad input, reported synchronously and never queued
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Retryable failure (dependency unavailable, timeout)
    #[error("Transient processing error: {0}")]
    TransientProcessing(String),

    /// Non-retryable failure (corrupt or unsupported content)
    #[error("Permanent processing error: {0}")]
    PermanentProcessing(String),

    /// Unknown document or job id
    #[error("Not found: {0}")]
    NotFound(String),

    /// The id exists but belongs to another owner
    #[error("Access denied: {0}")]
    Ownership(String),

    /// Status write rejected by the document state machine
    #[error("Invalid transition for document {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: DocumentStatus,
        to: DocumentStatus,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a transient (retryable) processing error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientProcessing(message.into())
    }

    /// Create a permanent (non-retryable) processing error
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::PermanentProcessing(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the job queue may retry after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientProcessing(_) | Self::Internal(_))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            Error::TransientProcessing(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "transient_error")
            }
            Error::PermanentProcessing(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "processing_error")
            }
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Ownership(_) => (StatusCode::FORBIDDEN, "forbidden"),
            Error::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            Error::Json(_) => (StatusCode::BAD_REQUEST, "json_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(Error::transient("embedding service down").is_retryable());
        assert!(Error::internal("worker panicked").is_retryable());
        assert!(!Error::permanent("unsupported encoding").is_retryable());
        assert!(!Error::validation("too large").is_retryable());
        assert!(!Error::NotFound("doc_x".into()).is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            Error::validation("x").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Ownership("doc".into()).into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::NotFound("doc".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
