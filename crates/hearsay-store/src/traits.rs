//! Store trait: the abstract interface for message persistence.
//!
//! This trait keeps the node storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests). Queries are layered on top
//! in [`crate::query::StoreExt`].

use async_trait::async_trait;
use hearsay_core::{Message, MessageHash, Proof, SignedMessage};

use crate::error::Result;
use crate::index::IndexEntry;

/// A persisted message. Owned by the store; handed out as clones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRecord {
    pub hash: MessageHash,
    pub message: Message,
    pub proof: Option<Proof>,
}

impl StoreRecord {
    pub fn new(message: Message, proof: Option<Proof>) -> Self {
        Self {
            hash: message.hash(),
            message,
            proof,
        }
    }

    /// The record in its wire form.
    pub fn signed(&self) -> SignedMessage {
        SignedMessage::new(self.message.clone(), self.proof.clone())
    }
}

/// Range options for [`Store::scan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Iterate from the highest key down.
    pub reverse: bool,
    /// Exclusive cursor: start strictly after (or before, when reversed)
    /// this entry.
    pub after: Option<IndexEntry>,
    pub limit: Option<usize>,
}

/// The Store trait: async interface for message persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, `spawn_blocking` keeps the runtime free.
///
/// # Design Notes
///
/// - **Insert-only**: messages are never updated or deleted.
/// - **Idempotent inserts**: inserting a known hash returns `None`.
/// - **Atomic fan-out**: the existence check, the primary write and every
///   index write happen in one critical section, so readers never observe
///   a message without its index entries.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a message and its index entries.
    ///
    /// Returns the new record, or `None` if the hash was already stored.
    async fn insert(&self, signed: &SignedMessage) -> Result<Option<StoreRecord>>;

    /// Get a record by content hash.
    async fn get(&self, hash: &MessageHash) -> Result<Option<StoreRecord>>;

    /// Check if a hash is stored.
    async fn has(&self, hash: &MessageHash) -> Result<bool>;

    /// Read entries from one sublevel in key order.
    async fn scan(&self, sublevel: &str, options: ScanOptions) -> Result<Vec<IndexEntry>>;

    /// Number of entries in a sublevel.
    async fn count(&self, sublevel: &str) -> Result<usize>;

    /// Total number of stored messages.
    async fn len(&self) -> Result<usize>;

    /// Every author with at least one stored message, sorted.
    async fn list_authors(&self) -> Result<Vec<String>>;

    /// Release the backend. Later calls fail with `StoreError::Closed`.
    async fn close(&self) -> Result<()>;
}
