//! Error Module
//!
//! Failure taxonomy for the connection layer. Every variant that ends a
//! statement execution carries the engine status that ended it, so callers
//! who ignore the details still get a plain `Err`, and callers who care can
//! ask for the status code.
use crate::core::engine::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for connection and statement operations.
#[derive(Error, Debug)]
pub enum GuardError {
    /// The connection has no open handle; nothing was sent to the engine
    #[error("Connection not ready: {}", path.display())]
    NotReady { path: PathBuf },

    /// Lock contention outlasted local retries and one reconnect
    #[error("Database busy ({status}): {message}")]
    Contention { status: StatusCode, message: String },

    /// I/O failure that one reconnect did not heal
    #[error("Disk I/O error: {message}")]
    FatalIo { message: String },

    /// Any other engine failure, after one reconnect
    #[error("Engine error ({code}): {message}")]
    Engine { code: i32, message: String },

    /// The replacement handle could not be opened during recovery
    #[error("Reconnect to {} failed after {status}", path.display())]
    ReconnectFailure { path: PathBuf, status: StatusCode },

    /// Transaction misuse detected before reaching the engine
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// SQLite refused to open, configure or close a handle
    #[error("Database error: {0}")]
    Open(#[from] rusqlite::Error),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GuardError {
    /// The engine status that ended the call, if the engine was reached.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            GuardError::Contention { status, .. } => Some(*status),
            GuardError::FatalIo { .. } => Some(StatusCode::IoError),
            GuardError::Engine { code, .. } => Some(StatusCode::Other(*code)),
            GuardError::ReconnectFailure { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Builds the give-up error for the last status seen by the executor.
    pub(crate) fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::Busy | StatusCode::Locked => GuardError::Contention { status, message },
            StatusCode::IoError => GuardError::FatalIo { message },
            other => GuardError::Engine {
                code: other.code(),
                message,
            },
        }
    }
}

/// Type alias for Result to use GuardError as the error type.
pub type Result<T> = std::result::Result<T, GuardError>;
