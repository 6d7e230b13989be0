//! Error types for the sync module.

use thiserror::Error;

use crate::transport::PeerId;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Peer sent a response that does not fit the protocol. Aborts only
    /// the branch that received it.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Peer is not connected.
    #[error("peer not connected: {0}")]
    PeerNotConnected(PeerId),

    /// No handler registered for a protocol id.
    #[error("no handler for protocol {0}")]
    NoHandler(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] hearsay_store::StoreError),

    /// Message bytes from a peer failed to decode.
    #[error("codec error: {0}")]
    Codec(#[from] hearsay_core::CodecError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timeout waiting for peer.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// A branch used up its request budget before converging.
    #[error("request budget exhausted after {0} requests")]
    BudgetExhausted(usize),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
