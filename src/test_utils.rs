//! # Test Utilities Module
//!
//! A scripted stand-in for the SQL engine, used to drive the connection layer
//! through states a real SQLite file only reaches under load or failure.
//!
//! This module provides:
//! - Scripted result codes (BUSY, IOERR, any other code) per `exec`
//! - Canned result rows and change counts
//! - Slow executions and in-flight tracking for guard tests
//! - Open and rollback failure switches, and failures keyed on SQL text
//! - An ordered log of statements and handle closes

use crate::config::ConnectionConfig;
use crate::core::engine::{Engine, EngineHandle, ExecOutcome, OpenFlags, RowEvent, StatusCode};
use crate::core::{GuardError, Result};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Connection settings with a 1 ms busy backoff, so retry tests stay fast.
pub fn fast_config() -> ConnectionConfig {
    ConnectionConfig {
        busy_retry_delay_ms: 1,
        ..ConnectionConfig::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Time window of one stub `exec` call.
#[derive(Debug, Clone)]
pub struct ExecSpan {
    pub sql: String,
    pub start: Instant,
    pub end: Instant,
}

impl ExecSpan {
    /// `true` if this span shares any instant with `[start, end]`.
    pub fn overlaps(&self, start: Instant, end: Instant) -> bool {
        self.start < end && start < self.end
    }
}

#[derive(Debug, Default)]
struct StubState {
    opens: AtomicUsize,
    closes: AtomicUsize,
    execs: AtomicUsize,
    fail_opens: AtomicBool,
    fail_rollback: AtomicBool,
    script: Mutex<VecDeque<StatusCode>>,
    /// Status once the script is exhausted; `None` means OK
    fallback: Mutex<Option<StatusCode>>,
    columns: Mutex<Vec<String>>,
    rows: Mutex<Vec<Vec<Option<String>>>>,
    changes: AtomicU64,
    delay: Mutex<Duration>,
    busy_timeout: Mutex<Option<Duration>>,
    executed: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    spans: Mutex<Vec<ExecSpan>>,
    counter_reads: Mutex<Vec<Instant>>,
    /// (SQL prefix, status) pairs checked before the script
    failing_sql: Mutex<Vec<(String, StatusCode)>>,
    events: Mutex<Vec<StubEvent>>,
}

/// One entry of the stub's ordered event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubEvent {
    Exec(String),
    Close,
}

impl StubState {
    fn next_status(&self, sql: &str) -> StatusCode {
        if self.fail_rollback.load(Ordering::SeqCst) && is_rollback(sql) {
            return StatusCode::Other(rusqlite::ffi::SQLITE_ERROR);
        }
        if let Some((_, status)) = lock(&self.failing_sql)
            .iter()
            .find(|(prefix, _)| sql.trim_start().starts_with(prefix.as_str()))
        {
            return *status;
        }
        lock(&self.script)
            .pop_front()
            .or(*lock(&self.fallback))
            .unwrap_or(StatusCode::Ok)
    }
}

fn is_rollback(sql: &str) -> bool {
    sql.trim().to_ascii_uppercase().starts_with("ROLLBACK")
}

/// Engine stub shared between the test and the connection under test.
///
/// Clones share state, so a test keeps one clone for scripting and
/// inspection and hands another to `Database::open`.
#[derive(Debug, Clone, Default)]
pub struct StubEngine {
    state: Arc<StubState>,
}

impl StubEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues statuses returned by the next `exec` calls, in order.
    pub fn push_statuses(&self, statuses: &[StatusCode]) {
        lock(&self.state.script).extend(statuses.iter().copied());
    }

    /// Status returned once the queued statuses run out.
    pub fn set_fallback(&self, status: StatusCode) {
        *lock(&self.state.fallback) = Some(status);
    }

    /// Rows emitted by every successful `exec`.
    pub fn set_rows(&self, columns: &[&str], rows: Vec<Vec<Option<&str>>>) {
        *lock(&self.state.columns) = columns.iter().map(|c| c.to_string()).collect();
        *lock(&self.state.rows) = rows
            .into_iter()
            .map(|row| row.into_iter().map(|v| v.map(String::from)).collect())
            .collect();
    }

    pub fn set_changes(&self, changes: u64) {
        self.state.changes.store(changes, Ordering::SeqCst);
    }

    /// Makes every `exec` take at least `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.state.delay) = delay;
    }

    pub fn fail_opens(&self, fail: bool) {
        self.state.fail_opens.store(fail, Ordering::SeqCst);
    }

    /// Makes every ROLLBACK statement fail.
    pub fn fail_rollback(&self, fail: bool) {
        self.state.fail_rollback.store(fail, Ordering::SeqCst);
    }

    /// Makes every statement starting with `prefix` fail with `status`,
    /// independent of the script.
    pub fn fail_sql(&self, prefix: &str, status: StatusCode) {
        lock(&self.state.failing_sql).push((prefix.to_string(), status));
    }

    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn exec_count(&self) -> usize {
        self.state.execs.load(Ordering::SeqCst)
    }

    /// SQL text of every `exec`, across all handles, in call order.
    pub fn executed(&self) -> Vec<String> {
        lock(&self.state.executed).clone()
    }

    /// Statements and handle closes, across all handles, in order.
    pub fn events(&self) -> Vec<StubEvent> {
        lock(&self.state.events).clone()
    }

    /// Most `exec` calls ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn spans(&self) -> Vec<ExecSpan> {
        lock(&self.state.spans).clone()
    }

    /// When each `changes()` read happened.
    pub fn counter_reads(&self) -> Vec<Instant> {
        lock(&self.state.counter_reads).clone()
    }

    /// Busy timeout hint applied to the most recent handle.
    pub fn busy_timeout_hint(&self) -> Option<Duration> {
        *lock(&self.state.busy_timeout)
    }
}

impl Engine for StubEngine {
    type Handle = StubHandle;

    fn open(&self, _path: &Path, _flags: OpenFlags) -> Result<StubHandle> {
        if self.state.fail_opens.load(Ordering::SeqCst) {
            return Err(GuardError::Open(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                Some("unable to open database file".to_string()),
            )));
        }
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        Ok(StubHandle {
            state: Arc::clone(&self.state),
            autocommit: AtomicBool::new(true),
            last_error: Mutex::new("not an error".to_string()),
        })
    }
}

/// Handle produced by [`StubEngine`]; tracks its own autocommit flag.
#[derive(Debug)]
pub struct StubHandle {
    state: Arc<StubState>,
    autocommit: AtomicBool,
    last_error: Mutex<String>,
}

impl StubHandle {
    fn track_transaction(&self, sql: &str) {
        let upper = sql.trim().to_ascii_uppercase();
        if upper.starts_with("BEGIN") {
            self.autocommit.store(false, Ordering::SeqCst);
        } else if upper.starts_with("COMMIT") || upper.starts_with("END") || upper.starts_with("ROLLBACK") {
            self.autocommit.store(true, Ordering::SeqCst);
        }
    }
}

impl EngineHandle for StubHandle {
    fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        *lock(&self.state.busy_timeout) = Some(timeout);
        Ok(())
    }

    fn exec(&self, sql: &str, on_row: &mut dyn FnMut(RowEvent<'_>)) -> ExecOutcome {
        let state = &self.state;
        state.execs.fetch_add(1, Ordering::SeqCst);
        lock(&state.executed).push(sql.to_string());
        lock(&state.events).push(StubEvent::Exec(sql.to_string()));

        let running = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let start = Instant::now();

        let delay = *lock(&state.delay);
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let status = state.next_status(sql);
        let outcome = if status.is_ok() {
            self.track_transaction(sql);
            let columns = lock(&state.columns).clone();
            for values in lock(&state.rows).iter() {
                on_row(RowEvent {
                    columns: &columns,
                    values,
                });
            }
            *lock(&self.last_error) = "not an error".to_string();
            ExecOutcome::ok()
        } else {
            let message = format!("stub failure: {} in {}", status, sql);
            *lock(&self.last_error) = message.clone();
            ExecOutcome::failed(status, message)
        };

        state.in_flight.fetch_sub(1, Ordering::SeqCst);
        lock(&state.spans).push(ExecSpan {
            sql: sql.to_string(),
            start,
            end: Instant::now(),
        });
        outcome
    }

    fn changes(&self) -> u64 {
        lock(&self.state.counter_reads).push(Instant::now());
        self.state.changes.load(Ordering::SeqCst)
    }

    fn is_autocommit(&self) -> bool {
        self.autocommit.load(Ordering::SeqCst)
    }

    fn last_error_message(&self) -> String {
        lock(&self.last_error).clone()
    }

    fn close(self) -> Result<()> {
        lock(&self.state.events).push(StubEvent::Close);
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
