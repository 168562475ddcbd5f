//! Error types for segment-dl
//!
//! This module provides error handling for the library, including:
//! - The transfer taxonomy shared by the prober, the segment workers and the aggregator
//! - Persistence and control errors
//! - HTTP status code mapping and structured error responses for the REST API

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for segment-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for segment-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Download control error (not found, invalid state)
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Probe, segment transfer or storage failure
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// HTTP client error outside of a transfer (client construction etc.)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Download control errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Download not found in the store
    #[error("download {id} not found")]
    NotFound {
        /// The download ID that was not found
        id: i64,
    },

    /// Downloaded file is missing on disk
    #[error("download {id} file not found at {path}")]
    FileNotFound {
        /// The download ID whose file was not found
        id: i64,
        /// The path where the file was expected to be
        path: PathBuf,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} download {id} in state {current_state}")]
    InvalidState {
        /// The download ID that is in an invalid state for the operation
        id: i64,
        /// The operation that was attempted (e.g., "pause", "open")
        operation: String,
        /// The current state that prevents the operation
        current_state: String,
    },
}

/// Failures of a probe, a segment worker or the output file.
///
/// Messages are user-visible: the `Display` output is what ends up in a failed
/// download's `errorMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// Connection or timeout failure before any state exists
    #[error("{0}")]
    UnreachableResource(String),

    /// Bad status code, bad URL or missing/zero content length
    #[error("{0}")]
    InvalidResource(String),

    /// Mid-transfer I/O or protocol failure on a segment
    #[error("{0}")]
    Network(String),

    /// Pause or shutdown requested; maps to PAUSED, never to FAILED
    #[error("cancelled")]
    Cancelled,

    /// A worker received no data for the configured stall window
    #[error("{0}")]
    Timeout(String),

    /// Output file could not be allocated or written
    #[error("{0}")]
    Storage(String),
}

impl TransferError {
    /// Whether this failure came from a pause/shutdown request
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }

    /// Prefix the message with the failing segment's byte range.
    ///
    /// Cancellation is left untouched so it can still be recognized downstream.
    pub fn for_segment(self, start: u64, end: u64) -> Self {
        let prefix = |msg: String| format!("Error downloading part {start}-{end}: {msg}");
        match self {
            TransferError::Network(m) => TransferError::Network(prefix(m)),
            TransferError::Storage(m) => TransferError::Storage(prefix(m)),
            TransferError::InvalidResource(m) => TransferError::InvalidResource(prefix(m)),
            TransferError::UnreachableResource(m) => {
                TransferError::UnreachableResource(prefix(m))
            }
            other => other,
        }
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            TransferError::UnreachableResource(e.to_string())
        } else {
            TransferError::Network(e.to_string())
        }
    }
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "download_not_found",
///     "message": "download error: download 123 not found",
///     "details": {
///       "download_id": 123
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "download_not_found", "invalid_state")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,

            // 404 Not Found
            Error::Download(DownloadError::NotFound { .. }) => 404,
            Error::Download(DownloadError::FileNotFound { .. }) => 404,

            // 409 Conflict
            Error::Download(DownloadError::InvalidState { .. }) => 409,

            Error::Transfer(TransferError::InvalidResource(_)) => 422,
            Error::Transfer(TransferError::Cancelled) => 409,
            Error::Transfer(TransferError::Storage(_)) => 507,
            Error::Transfer(TransferError::UnreachableResource(_)) => 502,
            Error::Transfer(TransferError::Network(_)) => 502,
            Error::Transfer(TransferError::Timeout(_)) => 504,

            // 500 Internal Server Error
            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,

            Error::Network(_) => 502,

            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) => "database_error",
            Error::Sqlx(_) => "database_error",
            Error::Download(e) => match e {
                DownloadError::NotFound { .. } => "download_not_found",
                DownloadError::FileNotFound { .. } => "file_not_found",
                DownloadError::InvalidState { .. } => "invalid_state",
            },
            Error::Transfer(e) => match e {
                TransferError::UnreachableResource(_) => "unreachable_resource",
                TransferError::InvalidResource(_) => "invalid_resource",
                TransferError::Network(_) => "network_error",
                TransferError::Cancelled => "cancelled",
                TransferError::Timeout(_) => "timeout",
                TransferError::Storage(_) => "storage_error",
            },
            Error::Io(_) => "io_error",
            Error::ShuttingDown => "shutting_down",
            Error::Network(_) => "network_error",
            Error::ApiServerError(_) => "api_server_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Download(DownloadError::NotFound { id }) => Some(serde_json::json!({
                "download_id": id,
            })),
            Error::Download(DownloadError::FileNotFound { id, path }) => Some(serde_json::json!({
                "download_id": id,
                "path": path,
            })),
            Error::Download(DownloadError::InvalidState {
                id,
                operation,
                current_state,
            }) => Some(serde_json::json!({
                "download_id": id,
                "operation": operation,
                "current_state": current_state,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
