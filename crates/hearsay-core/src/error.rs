//! Error types for hearsay core.

use thiserror::Error;

/// Errors raised by the hex codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A value exceeds its declared bound. The caller built an invalid message.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Malformed or truncated wire data.
    #[error("decoding error: {0}")]
    Decoding(String),
}

/// Key and signature parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature")]
    InvalidSignature,
}

/// Errors raised by the per-author Merkle tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    /// The tree is full. This is a configuration error, not a runtime condition.
    #[error("tree capacity exceeded: depth {depth} holds at most {capacity} leaves")]
    CapacityExceeded { depth: usize, capacity: usize },

    #[error("invalid tree depth: {0}")]
    InvalidDepth(usize),
}

/// Proof validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message carries no proof")]
    MissingProof,

    #[error("proof does not verify for author {author}")]
    ProofInvalid { author: String },

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl From<CodecError> for ValidationError {
    fn from(e: CodecError) -> Self {
        ValidationError::StructuralError(e.to_string())
    }
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
