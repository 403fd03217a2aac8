//! Error types shared by the stores and the capture pipeline

use std::fmt;

use crate::models::RecordingType;

/// Boxed error used for plumbing code and the CLI
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Failures reported by the device, recording and subscription stores
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Query or connection failure in the database
    Database(String),
    /// Object storage read/write failure
    Storage(String),
    /// Row or object does not exist
    NotFound(String),
    /// Request rejected before reaching the backend
    Invalid(String),
    /// Backend cannot be reached at all
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Database(msg) => write!(f, "Database error: {}", msg),
            StoreError::Storage(msg) => write!(f, "Storage error: {}", msg),
            StoreError::NotFound(msg) => write!(f, "Not found: {}", msg),
            StoreError::Invalid(msg) => write!(f, "Invalid request: {}", msg),
            StoreError::Unavailable(msg) => write!(f, "Backend unavailable: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Database(format!("invalid JSON column: {}", err))
    }
}

/// Failures of the capture pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// Permission denied or hardware not available
    Acquisition(String),
    /// Container or codec not supported by the capture backend
    Unsupported(String),
    /// Capture finished without producing any bytes
    EmptyArtifact(RecordingType),
    /// Recorder task ended abnormally
    Recorder(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Acquisition(msg) => write!(f, "Failed to acquire capture device: {}", msg),
            CaptureError::Unsupported(msg) => write!(f, "Unsupported capture format: {}", msg),
            CaptureError::EmptyArtifact(kind) => write!(f, "Empty {} file", kind.as_str()),
            CaptureError::Recorder(msg) => write!(f, "Recorder failed: {}", msg),
        }
    }
}

impl std::error::Error for CaptureError {}
