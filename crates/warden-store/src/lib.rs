//! Persistence layer for wardend
//!
//! Provides:
//! - The `Store` trait: the object-store boundary the engine is injected
//!   with (instances, templates, atomic metadata patches with optimistic
//!   concurrency, deletion)
//! - Typed accessors over the per-instance timer state
//! - Audit log (append-only)
//! - A SQLite-backed implementation

mod audit;
mod sqlite;
mod state;
mod traits;

pub use audit::*;
pub use sqlite::*;
pub use state::*;
pub use traits::*;

use thiserror::Error;
use warden_util::WardenError;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The resource changed since it was read; the write was rejected.
    #[error("Conflict on {key}: expected revision {expected}, found {found}")]
    Conflict { key: String, expected: u64, found: u64 },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for WardenError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { .. } => WardenError::Conflict(e.to_string()),
            StoreError::NotFound(what) => WardenError::InstanceNotFound(what),
            other => WardenError::StoreError(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
