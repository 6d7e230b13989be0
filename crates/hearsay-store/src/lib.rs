//! # Hearsay Store
//!
//! Storage for hearsay messages. Provides a trait-based interface with
//! SQLite and in-memory implementations, the secondary index layout, the
//! feed/profile/meta query layer and the per-author tree cache.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait every backend implements
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`StoreExt`] - Feed and aggregate queries over any [`Store`]
//! - [`Ledger`] - Store plus Merkle tree cache; the single insert path
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hearsay_store::{Ledger, LedgerConfig, QueryOptions, SqliteStore, StoreExt};
//! use hearsay_core::MessageKind;
//!
//! async fn example() -> hearsay_store::Result<()> {
//!     let store = Arc::new(SqliteStore::open("hearsay.db")?);
//!     let ledger = Ledger::new(store, LedgerConfig::default());
//!
//!     // let record = ledger.insert(&signed).await?;
//!
//!     let feed = ledger
//!         .store()
//!         .query_global(
//!             MessageKind::Post,
//!             hearsay_store::query::top_level_posts,
//!             QueryOptions::newest_first().with_limit(20),
//!         )
//!         .await?;
//!     println!("{} posts", feed.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Insert-only**: messages are never updated or deleted
//! - **Idempotent inserts**: a known hash returns `None`, not an error
//! - **Atomic fan-out**: a message and all its index entries land together
//! - **Bounded trees**: inserts past an author's tree capacity are refused

pub mod error;
pub mod index;
pub mod ledger;
pub mod memory;
pub mod migration;
pub mod query;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use index::IndexEntry;
pub use ledger::{Ledger, LedgerConfig};
pub use memory::MemoryStore;
pub use query::{PostMeta, Predicate, Profile, QueryOptions, StoreExt, UserMeta};
pub use sqlite::SqliteStore;
pub use traits::{ScanOptions, Store, StoreRecord};
