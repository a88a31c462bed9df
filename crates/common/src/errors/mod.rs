//! Error types for QueryBridge
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling
//!
//! Partial failures (a subset of tables or files failing while the overall
//! operation continues) are deliberately NOT errors here; they travel as
//! warnings on the partial result.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,
    UnsupportedFormat,

    // Connectivity errors (2xxx)
    ConnectivityError,

    // Resource errors (4xxx)
    NotFound,
    JobNotFound,
    ConnectionNotFound,

    // Timeouts (6xxx)
    Timeout,

    // Data source errors (7xxx)
    DatabaseError,

    // External service errors (8xxx)
    TranslationError,
    EmbeddingError,
    ExtractionError,

    // Job errors (85xx)
    JobFailure,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::UnsupportedFormat => 1003,

            // Connectivity (2xxx)
            ErrorCode::ConnectivityError => 2001,

            // Resources (4xxx)
            ErrorCode::NotFound => 4001,
            ErrorCode::JobNotFound => 4002,
            ErrorCode::ConnectionNotFound => 4003,

            // Timeouts (6xxx)
            ErrorCode::Timeout => 6001,

            // Data source (7xxx)
            ErrorCode::DatabaseError => 7001,

            // External (8xxx)
            ErrorCode::TranslationError => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::ExtractionError => 8003,

            // Jobs (85xx)
            ErrorCode::JobFailure => 8501,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Unsupported file format: {file_name}")]
    UnsupportedFormat { file_name: String },

    // Connectivity: the source database is unreachable or rejects
    // credentials. Surfaced verbatim on discover, never retried.
    #[error("Connection failed: {message}")]
    Connectivity { message: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    #[error("Unknown connection: {id}")]
    ConnectionNotFound { id: String },

    // Bounded external call exceeded its deadline
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    // Data source errors
    #[error("Database error: {message}")]
    Database { message: String },

    // External service errors
    #[error("SQL translation error: {message}")]
    Translation { message: String },

    #[error("Embedding service error: {message}")]
    Embedding { message: String },

    #[error("Text extraction error: {message}")]
    Extraction { message: String },

    // Job-level fault in ingestion
    #[error("Ingestion job failed: {message}")]
    JobFailure { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a validation error without a field reference
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            AppError::Connectivity { .. } => ErrorCode::ConnectivityError,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::JobNotFound { .. } => ErrorCode::JobNotFound,
            AppError::ConnectionNotFound { .. } => ErrorCode::ConnectionNotFound,
            AppError::Timeout { .. } => ErrorCode::Timeout,
            AppError::Database { .. } => ErrorCode::DatabaseError,
            AppError::Translation { .. } => ErrorCode::TranslationError,
            AppError::Embedding { .. } => ErrorCode::EmbeddingError,
            AppError::Extraction { .. } => ErrorCode::ExtractionError,
            AppError::JobFailure { .. } => ErrorCode::JobFailure,
            AppError::HttpClient(_) => ErrorCode::TranslationError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request: the caller must fix and resubmit. This
            // includes Connectivity: an unreachable source or rejected
            // credentials means the supplied connection string is unusable.
            AppError::Validation { .. }
            | AppError::MissingField { .. }
            | AppError::UnsupportedFormat { .. }
            | AppError::Connectivity { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::NotFound { .. }
            | AppError::JobNotFound { .. }
            | AppError::ConnectionNotFound { .. } => StatusCode::NOT_FOUND,

            // 504 Gateway Timeout
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,

            // 502 Bad Gateway
            AppError::Translation { .. }
            | AppError::Embedding { .. }
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 500 Internal Server Error
            AppError::Database { .. }
            | AppError::Extraction { .. }
            | AppError::JobFailure { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for the API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let field = match &self {
            AppError::Validation { field, .. } => field.clone(),
            AppError::MissingField { field } => Some(field.clone()),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}
