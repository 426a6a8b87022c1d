//! Thread-safe, self-healing access to one SQLite database file.
//!
//! A [`Database`] owns a single engine handle behind a readers-writer guard.
//! Statements retry briefly on lock contention, reconnect once on I/O or
//! engine failures, and report a plain `Result` either way.
//!
//! ```no_run
//! use sqlguard::{ConnectionConfig, Database};
//!
//! let db = Database::open_sqlite("app.db", &ConnectionConfig::default());
//! db.execute("CREATE TABLE IF NOT EXISTS kv (k TEXT PRIMARY KEY, v TEXT)")?;
//! let changed = db.execute_counted("INSERT OR REPLACE INTO kv VALUES ('a', '1')")?;
//! assert_eq!(changed, 1);
//! # Ok::<(), sqlguard::GuardError>(())
//! ```

// Core infrastructure modules
pub mod core;

pub mod config;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crate::config::{Config, ConnectionConfig, Profile, RetryMode};
pub use crate::core::db::{ChangeCount, Connection, Database, Execution, ResultSet, Statement};
pub use crate::core::engine::{
    Engine, EngineHandle, ExecOutcome, OpenFlags, RowEvent, SqliteEngine, StatusCode,
};
pub use crate::core::{GuardError, Result};
