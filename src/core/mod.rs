//! Core Module
//!
//! The engine boundary, the guarded connection layer built on it, and the
//! shared error type.

pub mod db;
pub mod engine;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{GuardError, Result};
