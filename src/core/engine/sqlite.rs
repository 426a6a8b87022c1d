//! SQLite Engine
//!
//! `Engine` implementation over `rusqlite`. Statement text is run through
//! `rusqlite::Batch`, one statement at a time, so multi-statement text behaves
//! the way `sqlite3_exec` does: every row of every statement reaches the
//! callback, and execution stops at the first failing statement.

use super::{Engine, EngineHandle, ExecOutcome, OpenFlags, RowEvent, StatusCode};
use crate::core::{GuardError, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Batch, Connection, ErrorCode};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::warn;

/// What `sqlite3_errmsg` reports when the last call succeeded.
const NOT_AN_ERROR: &str = "not an error";

/// Opens `rusqlite` connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteEngine;

impl Engine for SqliteEngine {
    type Handle = SqliteHandle;

    fn open(&self, path: &Path, flags: OpenFlags) -> Result<SqliteHandle> {
        let conn = Connection::open_with_flags(path, to_rusqlite_flags(flags))
            .map_err(GuardError::Open)?;
        Ok(SqliteHandle {
            conn: Mutex::new(conn),
            last_error: Mutex::new(NOT_AN_ERROR.to_string()),
        })
    }
}

fn to_rusqlite_flags(flags: OpenFlags) -> rusqlite::OpenFlags {
    let mut out = if flags.read_write {
        rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
    } else {
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
    };
    if flags.create {
        out |= rusqlite::OpenFlags::SQLITE_OPEN_CREATE;
    }
    if flags.full_mutex {
        out |= rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    } else {
        out |= rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX;
    }
    out
}

/// A `rusqlite::Connection` usable from several threads at once.
///
/// The mutex plays the part of SQLite's FULLMUTEX mode: callers admitted
/// together by the shared side of the connection guard are serialized here,
/// inside the engine boundary.
#[derive(Debug)]
pub struct SqliteHandle {
    conn: Mutex<Connection>,
    last_error: Mutex<String>,
}

impl SqliteHandle {
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_error(&self, message: String) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = message;
    }
}

impl EngineHandle for SqliteHandle {
    fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.conn().busy_timeout(timeout).map_err(GuardError::Open)
    }

    fn exec(&self, sql: &str, on_row: &mut dyn FnMut(RowEvent<'_>)) -> ExecOutcome {
        // The connection stays locked until the message is taken, so a
        // statement from another shared caller cannot overwrite it first.
        let conn = self.conn();
        match run_batch(&conn, sql, on_row) {
            Ok(()) => {
                self.record_error(NOT_AN_ERROR.to_string());
                ExecOutcome::ok()
            }
            Err(err) => {
                let message = error_message(&err);
                self.record_error(message.clone());
                ExecOutcome::failed(status_of(&err), message)
            }
        }
    }

    fn changes(&self) -> u64 {
        self.conn().changes()
    }

    fn is_autocommit(&self) -> bool {
        self.conn().is_autocommit()
    }

    fn last_error_message(&self) -> String {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn close(self) -> Result<()> {
        let conn = self.conn.into_inner().unwrap_or_else(PoisonError::into_inner);
        conn.close().map_err(|(_conn, err)| {
            warn!("SQLite refused to close handle: {}", err);
            GuardError::Open(err)
        })
    }
}

fn run_batch(
    conn: &Connection,
    sql: &str,
    on_row: &mut dyn FnMut(RowEvent<'_>),
) -> rusqlite::Result<()> {
    let mut batch = Batch::new(conn, sql);
    while let Some(mut stmt) = batch.next()? {
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let values = (0..columns.len())
                .map(|i| row.get_ref(i).map(cell_text))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            on_row(RowEvent {
                columns: &columns,
                values: &values,
            });
        }
    }
    Ok(())
}

/// Renders a cell the way `sqlite3_exec` hands it to its callback.
fn cell_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(real_text(f)),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}

/// SQLite's text form of a REAL (`%!.15g`): 15 significant digits, always a
/// decimal point, exponent form outside `1e-4 ..= 1e15`.
fn real_text(f: f64) -> String {
    if f.is_infinite() {
        return if f > 0.0 { "Inf".to_string() } else { "-Inf".to_string() };
    }
    if f == 0.0 {
        return "0.0".to_string();
    }

    // Rounded to 15 significant digits first, so the exponent already
    // reflects any carry (9.999...e14 becomes 1e15).
    let scientific = format!("{:.14e}", f);
    let (mantissa, exp) = match scientific.split_once('e') {
        Some((mantissa, exp)) => (mantissa, exp.parse::<i32>().unwrap_or_default()),
        None => (scientific.as_str(), 0),
    };

    if !(-4..15).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", with_point(mantissa), sign, exp.abs())
    } else {
        let fixed = format!("{:.*}", (14 - exp) as usize, f);
        with_point(&fixed)
    }
}

/// Drops trailing fractional zeros, keeping at least one digit after the point.
fn with_point(digits: &str) -> String {
    let mut out = if digits.contains('.') {
        digits.trim_end_matches('0').to_string()
    } else {
        digits.to_string()
    };
    if out.ends_with('.') {
        out.push('0');
    } else if !out.contains('.') {
        out.push_str(".0");
    }
    out
}

/// Maps a `rusqlite` error onto the executor's status buckets.
pub(crate) fn status_of(err: &rusqlite::Error) -> StatusCode {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::DatabaseBusy => StatusCode::Busy,
            ErrorCode::DatabaseLocked => StatusCode::Locked,
            ErrorCode::SystemIoFailure => StatusCode::IoError,
            _ => StatusCode::Other(failure.extended_code & 0xff),
        },
        _ => StatusCode::Other(rusqlite::ffi::SQLITE_ERROR),
    }
}

fn error_message(err: &rusqlite::Error) -> String {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => message.clone(),
        other => other.to_string(),
    }
}
