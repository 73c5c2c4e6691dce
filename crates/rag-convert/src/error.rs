//! Error types for the conversion service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for conversion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Conversion service errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upload has an extension outside the supported set
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// Malformed request (bad multipart body, too many files, ...)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Document parsing failed
    #[error("{0}")]
    Conversion(String),

    /// Chunking or tokenization failed
    #[error("{0}")]
    Chunking(String),

    /// Job lookup on an unknown identifier
    #[error("Job '{0}' not found")]
    JobNotFound(String),

    /// Disk I/O failure while persisting an upload
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// Job record cannot move from its current state
    #[error("Invalid job transition: {0}")]
    InvalidTransition(String),

    /// Background queue cannot take more work right now
    #[error("Service busy: {0}")]
    QueueFull(String),

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
    /// Create a conversion error
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion(message.into())
    }

    /// Create a chunking error
    pub fn chunking(message: impl Into<String>) -> Self {
        Self::Chunking(message.into())
    }

    /// Create a workspace error
    pub fn workspace(message: impl Into<String>) -> Self {
        Self::Workspace(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status this error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::UnsupportedFormat(_) | Error::InvalidRequest(_) | Error::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::JobNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidTransition(_) => StatusCode::CONFLICT,
            Error::QueueFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Config(_)
            | Error::Conversion(_)
            | Error::Chunking(_)
            | Error::Workspace(_)
            | Error::Io(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::UnsupportedFormat(_) => "unsupported_format",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Conversion(_) => "conversion_error",
            Error::Chunking(_) => "chunking_error",
            Error::JobNotFound(_) => "not_found",
            Error::Workspace(_) => "workspace_error",
            Error::InvalidTransition(_) => "invalid_transition",
            Error::QueueFull(_) => "queue_full",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Error::Conversion(msg) | Error::Chunking(msg) => {
                format!("Error while converting file: {}", msg)
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "type": self.error_type(),
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
