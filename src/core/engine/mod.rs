//! Engine Boundary
//!
//! The SQL engine is an external collaborator: it parses and runs SQL text
//! against one file and does its own file-level locking. This module names
//! the handful of capabilities the connection layer needs from it, so the
//! retry and guard logic can run against SQLite in production and against a
//! scripted stub in tests.

pub mod sqlite;

use crate::core::Result;
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub use sqlite::{SqliteEngine, SqliteHandle};

/// Result code of one `exec` call, reduced to the buckets the executor acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// Statement ran to completion
    Ok,
    /// Another connection holds the file lock
    Busy,
    /// A table-level lock is held on this connection's shared cache
    Locked,
    /// Disk I/O failed; the handle may be unusable until reopened
    IoError,
    /// Any other engine result code
    Other(i32),
}

impl StatusCode {
    /// Returns the engine's numeric result code for this status.
    pub fn code(&self) -> i32 {
        match self {
            StatusCode::Ok => rusqlite::ffi::SQLITE_OK,
            StatusCode::Busy => rusqlite::ffi::SQLITE_BUSY,
            StatusCode::Locked => rusqlite::ffi::SQLITE_LOCKED,
            StatusCode::IoError => rusqlite::ffi::SQLITE_IOERR,
            StatusCode::Other(code) => *code,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, StatusCode::Ok)
    }

    /// Busy and locked are both lock contention and retried locally.
    pub fn is_contention(&self) -> bool {
        matches!(self, StatusCode::Busy | StatusCode::Locked)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Ok => write!(f, "OK"),
            StatusCode::Busy => write!(f, "BUSY"),
            StatusCode::Locked => write!(f, "LOCKED"),
            StatusCode::IoError => write!(f, "IOERR"),
            StatusCode::Other(code) => write!(f, "error code {}", code),
        }
    }
}

/// What one `exec` call ended with.
///
/// The error text is captured inside the call, so a later statement on the
/// same handle cannot replace it before the caller reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    pub status: StatusCode,
    /// Engine error text; `None` on success
    pub message: Option<String>,
}

impl ExecOutcome {
    pub fn ok() -> Self {
        ExecOutcome {
            status: StatusCode::Ok,
            message: None,
        }
    }

    pub fn failed(status: StatusCode, message: impl Into<String>) -> Self {
        ExecOutcome {
            status,
            message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

/// Flags requested when opening a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    pub read_write: bool,
    pub create: bool,
    /// Ask the engine to serialize all calls on the handle internally
    pub full_mutex: bool,
}

impl OpenFlags {
    /// Read/write, create if missing, engine-side serialization.
    pub const READ_WRITE_CREATE_FULL_MUTEX: OpenFlags = OpenFlags {
        read_write: true,
        create: true,
        full_mutex: true,
    };
}

/// One result row handed to the `exec` callback.
///
/// The column count is whatever this row reports; a multi-statement text may
/// produce rows of different widths.
#[derive(Debug, Clone, Copy)]
pub struct RowEvent<'a> {
    /// Column names for the statement that produced this row
    pub columns: &'a [String],
    /// Cell values rendered as text, `None` for SQL NULL
    pub values: &'a [Option<String>],
}

impl RowEvent<'_> {
    pub fn column_count(&self) -> usize {
        self.values.len()
    }
}

/// Opens handles against a database file.
pub trait Engine: Send + Sync {
    type Handle: EngineHandle;

    /// Opens a new handle for `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine cannot produce a usable handle.
    fn open(&self, path: &Path, flags: OpenFlags) -> Result<Self::Handle>;
}

/// One live engine handle.
///
/// Handles are shared across threads behind the connection guard, so every
/// method takes `&self`; implementations serialize internally where the
/// engine requires it.
pub trait EngineHandle: Send + Sync {
    /// Informational busy-wait hint for the engine's own lock handler.
    fn set_busy_timeout(&self, timeout: Duration) -> Result<()>;

    /// Runs `sql` to completion, calling `on_row` once per result row.
    fn exec(&self, sql: &str, on_row: &mut dyn FnMut(RowEvent<'_>)) -> ExecOutcome;

    /// Rows changed by the most recently completed statement.
    fn changes(&self) -> u64;

    /// `false` while an explicit transaction is open.
    fn is_autocommit(&self) -> bool;

    /// Text of the most recent engine error on this handle.
    fn last_error_message(&self) -> String;

    /// Releases the handle.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}
