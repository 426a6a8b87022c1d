//! Statement Execution Module
//!
//! Drives one SQL text to completion against a [`Connection`], absorbing
//! transient lock contention with a short local backoff and giving fatal
//! errors exactly one reconnect. The guard is held only around the submit
//! step, so one caller's backoff never blocks another caller.

use super::connection::Connection;
use crate::config::{ConnectionConfig, RetryMode};
use crate::core::engine::{Engine, EngineHandle, RowEvent, SqliteEngine, StatusCode};
use crate::core::{GuardError, Result};
use std::path::Path;
use std::thread;
use tracing::{debug, warn};

/// Whether a statement needs the engine's changes counter.
///
/// Reading the counter is only meaningful if no other statement runs on the
/// handle between the execution and the read, so `Atomic` takes the exclusive
/// side of the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeCount {
    /// Shared guard; other statements may run alongside
    #[default]
    Skip,
    /// Exclusive guard; execution and counter read are one step
    Atomic,
}

/// One request to run SQL text.
#[derive(Debug, Clone, Copy)]
pub struct Statement<'a> {
    pub sql: &'a str,
    /// Allow local busy retries before escalating
    pub retry: bool,
    pub changes: ChangeCount,
}

impl<'a> Statement<'a> {
    pub fn new(sql: &'a str) -> Self {
        Statement {
            sql,
            retry: true,
            changes: ChangeCount::Skip,
        }
    }

    pub fn retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    pub fn count_changes(mut self) -> Self {
        self.changes = ChangeCount::Atomic;
        self
    }
}

/// Rows produced by one execution, every cell as text.
///
/// SQL NULL becomes an empty string. Column names are those reported with the
/// first row; later rows of a multi-statement text may be wider or narrower.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ResultSet {
    pub(crate) fn push_row(&mut self, row: RowEvent<'_>) {
        if self.rows.is_empty() {
            self.columns = row.columns.to_vec();
        }
        self.rows
            .push(row.values.iter().map(|v| v.clone().unwrap_or_default()).collect());
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Successful outcome of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub status: StatusCode,
    pub rows: ResultSet,
    /// Present when the statement asked for [`ChangeCount::Atomic`]
    pub changes: Option<u64>,
}

/// What one submit step produced.
struct Attempt {
    status: StatusCode,
    rows: ResultSet,
    changes: Option<u64>,
    message: String,
}

/// Call-scoped record of the one reconnect an execution may spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconnectState {
    NotAttempted,
    Attempted,
}

/// Statement executor over one guarded connection.
#[derive(Debug)]
pub struct Database<E: Engine> {
    connection: Connection<E>,
}

impl Database<SqliteEngine> {
    /// Opens a SQLite database file with the given settings.
    pub fn open_sqlite(path: impl AsRef<Path>, config: &ConnectionConfig) -> Self {
        Database::open(SqliteEngine, path, config)
    }

    /// Opens a SQLite database file with the defaults of the profile named by
    /// `SQLGUARD_PROFILE`.
    pub fn open_sqlite_default(path: impl AsRef<Path>) -> Self {
        Database::open_sqlite(path, &ConnectionConfig::from_env())
    }
}

impl<E: Engine> Database<E> {
    /// Opens the connection. Check [`is_ready`](Self::is_ready) afterwards.
    pub fn open(engine: E, path: impl AsRef<Path>, config: &ConnectionConfig) -> Self {
        Database {
            connection: Connection::open(engine, path, config),
        }
    }

    pub fn connection(&self) -> &Connection<E> {
        &self.connection
    }

    pub fn is_ready(&self) -> bool {
        self.connection.is_ready()
    }

    pub fn set_timeout(&self, mode: RetryMode) {
        self.connection.set_timeout(mode);
    }

    /// Runs a statement with retries, discarding nothing but the counter.
    pub fn execute(&self, sql: &str) -> Result<Execution> {
        self.execute_statement(&Statement::new(sql))
    }

    /// Fire-and-forget execution.
    pub fn execute_ok(&self, sql: &str) -> bool {
        self.execute(sql).is_ok()
    }

    /// Runs a statement and returns the rows it changed.
    pub fn execute_counted(&self, sql: &str) -> Result<u64> {
        let execution = self.execute_statement(&Statement::new(sql).count_changes())?;
        Ok(execution.changes.unwrap_or_default())
    }

    /// Runs a statement and returns its rows.
    pub fn query(&self, sql: &str) -> Result<ResultSet> {
        Ok(self.execute(sql)?.rows)
    }

    /// Drives `statement` until it succeeds or is given up.
    ///
    /// Busy/locked results are retried locally (unbounded in
    /// [`RetryMode::Unbounded`], otherwise up to the configured limit when the
    /// statement allows retries). Anything still failing earns one reconnect
    /// per call; a second failure after that is returned.
    ///
    /// # Errors
    ///
    /// - `NotReady` if there is no handle, without reaching the engine
    /// - `Contention`, `FatalIo` or `Engine` for the final status after the
    ///   reconnect was spent
    /// - `ReconnectFailure` if the replacement handle could not be opened
    pub fn execute_statement(&self, statement: &Statement<'_>) -> Result<Execution> {
        if !self.connection.is_ready() {
            return Err(self.not_ready());
        }

        let mode = self.connection.retry_mode();
        let config = self.connection.config();
        let mut busy_attempts: u32 = 0;
        let mut reconnect = ReconnectState::NotAttempted;

        loop {
            let attempt = self.submit(statement)?;

            match attempt.status {
                StatusCode::Ok => {
                    return Ok(Execution {
                        status: attempt.status,
                        rows: attempt.rows,
                        changes: attempt.changes,
                    });
                }
                status if status.is_contention() => {
                    let may_spin = match mode {
                        RetryMode::Unbounded => true,
                        RetryMode::Finite(_) => {
                            statement.retry && busy_attempts < config.busy_retry_limit
                        }
                    };
                    if may_spin {
                        busy_attempts = busy_attempts.saturating_add(1);
                        debug!("{} on attempt {}, backing off", status, busy_attempts);
                        thread::sleep(config.busy_retry_delay());
                        continue;
                    }
                }
                StatusCode::IoError => {}
                status => {
                    warn!("Statement failed ({}): {}", status, attempt.message);
                }
            }

            if reconnect == ReconnectState::Attempted {
                return Err(GuardError::from_status(attempt.status, attempt.message));
            }
            reconnect = ReconnectState::Attempted;
            warn!(
                "Reconnecting to {} after {}",
                self.connection.path().display(),
                attempt.status
            );
            if !self.connection.reconnect() {
                return Err(GuardError::ReconnectFailure {
                    path: self.connection.path().to_path_buf(),
                    status: attempt.status,
                });
            }
        }
    }

    /// One guarded trip to the engine. The guard is released on return.
    fn submit(&self, statement: &Statement<'_>) -> Result<Attempt> {
        let mut rows = ResultSet::default();

        let (outcome, changes) = match statement.changes {
            ChangeCount::Skip => {
                let slot = self.connection.read_slot();
                let handle = slot.as_ref().ok_or_else(|| self.not_ready())?;
                let outcome = handle.exec(statement.sql, &mut |row| rows.push_row(row));
                (outcome, None)
            }
            ChangeCount::Atomic => {
                let slot = self.connection.write_slot();
                let handle = slot.as_ref().ok_or_else(|| self.not_ready())?;
                let outcome = handle.exec(statement.sql, &mut |row| rows.push_row(row));
                let changes = outcome.is_ok().then(|| handle.changes());
                (outcome, changes)
            }
        };

        Ok(Attempt {
            status: outcome.status,
            rows,
            changes,
            message: outcome.message.unwrap_or_default(),
        })
    }

    fn not_ready(&self) -> GuardError {
        GuardError::NotReady {
            path: self.connection.path().to_path_buf(),
        }
    }

    /// Rolls back an open transaction, then closes the connection.
    ///
    /// # Returns
    ///
    /// `false` if the connection was already closed.
    pub fn close(&self) -> bool {
        if self.connection.is_ready() && self.is_in_transaction() {
            if let Err(e) = self.roll_back_transaction() {
                warn!("Could not roll back transaction before close: {}", e);
            }
        }
        self.connection.close()
    }
}

impl<E: Engine> Drop for Database<E> {
    fn drop(&mut self) {
        self.close();
    }
}
