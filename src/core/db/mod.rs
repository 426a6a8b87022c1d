//! Database Module
//!
//! The two layers that sit between callers and the engine:
//! - **Connection Management** (`connection.rs`): the one handle, its guard, open/reconnect/close
//! - **Statement Execution** (`executor.rs`): guard acquisition and the retry/reconnect loop
//! - **Transactions** (`transaction.rs`): begin/commit/rollback helpers and transaction state
pub mod connection;
pub mod executor;
pub mod transaction;

pub use connection::Connection;
pub use executor::{ChangeCount, Database, Execution, ResultSet, Statement};
