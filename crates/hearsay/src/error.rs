//! Error types for the node.

use hearsay_core::{CodecError, ValidationError};
use hearsay_store::StoreError;
use hearsay_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Structural validation error.
    #[error("validation error: {0}")]
    Validation(ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync or transport error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Message carries no proof.
    #[error("message has no proof")]
    MissingProof,

    /// Proof does not verify against the author.
    #[error("invalid proof for author {0}")]
    InvalidProof(String),

    #[error("node already started")]
    AlreadyStarted,

    #[error("node not started")]
    NotStarted,

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ValidationError> for NodeError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::MissingProof => NodeError::MissingProof,
            ValidationError::ProofInvalid { author } => NodeError::InvalidProof(author),
            other => NodeError::Validation(other),
        }
    }
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
