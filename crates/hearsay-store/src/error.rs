//! Error types for the store module.

use hearsay_core::{CodecError, MerkleError};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored encoding no longer decodes.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("merkle error: {0}")]
    Merkle(#[from] MerkleError),

    /// The author already fills their tree. Raise the configured depth;
    /// messages are never silently dropped.
    #[error("tree capacity exceeded for author {author}: at most {capacity} messages")]
    TreeCapacityExceeded { author: String, capacity: usize },

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// A lock was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    Poisoned(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A blocking task failed to complete.
    #[error("background task failed: {0}")]
    Task(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
