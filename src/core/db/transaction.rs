//! Transaction helpers.
//!
//! Thin wrappers over [`Database::execute`]; the engine's autocommit flag is
//! the only source of truth for whether a transaction is open. Nesting is not
//! supported: the begin helpers refuse to start a second transaction, because
//! the engine would reject it and the executor would answer that rejection
//! with a reconnect that rolls back the outer transaction.

use super::executor::Database;
use crate::core::engine::{Engine, EngineHandle};
use crate::core::{GuardError, Result};

impl<E: Engine> Database<E> {
    /// Starts a deferred transaction. [`end_transaction`](Self::end_transaction)
    /// must be called at the end.
    pub fn begin_transaction(&self) -> Result<()> {
        self.begin("BEGIN TRANSACTION")
    }

    pub fn begin_exclusive_transaction(&self) -> Result<()> {
        self.begin("BEGIN EXCLUSIVE TRANSACTION")
    }

    pub fn begin_immediate_transaction(&self) -> Result<()> {
        self.begin("BEGIN IMMEDIATE TRANSACTION")
    }

    /// Commits the open transaction.
    pub fn end_transaction(&self) -> Result<()> {
        self.execute("COMMIT").map(|_| ())
    }

    /// Cancels the open transaction and discards its changes.
    pub fn roll_back_transaction(&self) -> Result<()> {
        self.execute("ROLLBACK TRANSACTION").map(|_| ())
    }

    /// `true` while the engine is out of autocommit mode.
    pub fn is_in_transaction(&self) -> bool {
        self.connection()
            .read_slot()
            .as_ref()
            .map(|handle| !handle.is_autocommit())
            .unwrap_or(false)
    }

    /// The engine's most recent error text, `None` when there is no handle.
    pub fn last_error_message(&self) -> Option<String> {
        self.connection()
            .read_slot()
            .as_ref()
            .map(|handle| handle.last_error_message())
    }

    fn begin(&self, sql: &str) -> Result<()> {
        if self.is_in_transaction() {
            return Err(GuardError::Transaction(
                "Transaction already in progress".to_string(),
            ));
        }
        self.execute(sql).map(|_| ())
    }
}
