//! Connection Management Module
//!
//! Owns the single engine handle for one database file and the
//! readers-writer guard every access to it goes through. Consumers see either
//! a fully open handle or a not-ready connection, never a half-initialized
//! one. Opening never retries on its own; recovery belongs to the executor,
//! which calls [`Connection::reconnect`].

use crate::config::{ConnectionConfig, RetryMode};
use crate::core::engine::{Engine, EngineHandle, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

const ROLLBACK_SQL: &str = "ROLLBACK TRANSACTION";

/// Ownership of the one engine handle for a database file.
///
/// ## Guard discipline
///
/// - Ordinary statements take the shared side; the engine serializes
///   conflicting work internally.
/// - Counted statements, reconnect and close take the exclusive side.
/// - The `open` flag is only written while the exclusive side is held, so it
///   always agrees with the handle slot.
pub struct Connection<E: Engine> {
    engine: E,
    path: PathBuf,
    config: ConnectionConfig,
    handle: RwLock<Option<E::Handle>>,
    open: AtomicBool,
    retry_mode: Mutex<RetryMode>,
}

impl<E: Engine> Connection<E> {
    /// Creates the connection and tries to open its handle.
    ///
    /// Never fails: when the engine cannot open `path` the connection is
    /// returned not ready, and [`is_ready`](Self::is_ready) says so.
    ///
    /// # Arguments
    ///
    /// * `engine` - The engine used for this and every later open
    /// * `path` - Database file, created if missing
    /// * `config` - Retry budget and engine busy hint
    pub fn open(engine: E, path: impl AsRef<Path>, config: &ConnectionConfig) -> Self {
        let connection = Connection {
            engine,
            path: path.as_ref().to_path_buf(),
            config: config.clone(),
            handle: RwLock::new(None),
            open: AtomicBool::new(false),
            retry_mode: Mutex::new(config.retry_mode()),
        };

        {
            let mut slot = connection.write_slot();
            *slot = connection.open_handle();
            connection.open.store(slot.is_some(), Ordering::Release);
        }
        connection
    }

    /// Returns `true` if a usable handle currently exists.
    pub fn is_ready(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Replaces the retry mode used by executions that start after this call.
    pub fn set_timeout(&self, mode: RetryMode) {
        *self.retry_mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    pub fn retry_mode(&self) -> RetryMode {
        *self.retry_mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops the current handle and opens a replacement for the same path.
    ///
    /// Any transaction still open on the old handle is rolled back first,
    /// best-effort. Safe to call when the old handle is already broken or
    /// gone.
    ///
    /// # Returns
    ///
    /// `true` if the replacement handle was acquired.
    pub fn reconnect(&self) -> bool {
        // `open` stays as it was until the replacement is known: callers
        // that see it set queue on the guard instead of failing not-ready.
        let mut slot = self.write_slot();
        if let Some(old) = slot.take() {
            self.discard(old);
        }

        *slot = self.open_handle();
        let reopened = slot.is_some();
        self.open.store(reopened, Ordering::Release);
        if reopened {
            info!("Reconnected to {}", self.path.display());
        }
        reopened
    }

    /// Releases the handle, rolling back an open transaction first.
    ///
    /// # Returns
    ///
    /// `false` if the connection was already closed.
    pub fn close(&self) -> bool {
        let mut slot = self.write_slot();
        match slot.take() {
            Some(handle) => {
                self.open.store(false, Ordering::Release);
                self.discard(handle);
                true
            }
            None => {
                debug!("Close requested for {} but it is not open", self.path.display());
                false
            }
        }
    }

    /// Shared side of the guard; the slot is `None` when not ready.
    pub(crate) fn read_slot(&self) -> RwLockReadGuard<'_, Option<E::Handle>> {
        self.handle.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive side of the guard.
    pub(crate) fn write_slot(&self) -> RwLockWriteGuard<'_, Option<E::Handle>> {
        self.handle.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_handle(&self) -> Option<E::Handle> {
        let handle = match self
            .engine
            .open(&self.path, OpenFlags::READ_WRITE_CREATE_FULL_MUTEX)
        {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to open {}: {}", self.path.display(), e);
                return None;
            }
        };
        if let Err(e) = handle.set_busy_timeout(self.config.busy_timeout()) {
            warn!("Failed to set busy timeout on {}: {}", self.path.display(), e);
        }
        Some(handle)
    }

    /// Best-effort rollback, then close. Failures are logged, never raised.
    fn discard(&self, handle: E::Handle) {
        if !handle.is_autocommit() {
            let outcome = handle.exec(ROLLBACK_SQL, &mut |_| {});
            if !outcome.is_ok() {
                warn!(
                    "Could not roll back open transaction on {} ({}): {}",
                    self.path.display(),
                    outcome.status,
                    outcome.message()
                );
            }
        }
        if let Err(e) = handle.close() {
            warn!("Failed to close {}: {}", self.path.display(), e);
        }
    }
}

impl<E: Engine> Drop for Connection<E> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<E: Engine> std::fmt::Debug for Connection<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.path)
            .field("open", &self.is_ready())
            .field("retry_mode", &self.retry_mode())
            .finish()
    }
}
