//! Ledger: a store paired with its per-author Merkle tree cache.
//!
//! Every insert goes through [`Ledger::insert`], which serializes writers,
//! enforces tree capacity and invalidates the author's cached tree before
//! returning. Trees are built lazily from the `author/<a>/all` index and
//! cached for a TTL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use hearsay_core::{AuthTree, MessageHash, SignedMessage, TreeHash};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::index;
use crate::query::StoreExt;
use crate::traits::{Store, StoreRecord};

/// Tree shape and cache lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Tree depth including the root level.
    pub depth: usize,
    pub cache_ttl: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            depth: 15,
            cache_ttl: Duration::from_secs(60),
        }
    }
}

#[derive(Default)]
struct CacheSlot {
    /// Bumped on every insert for the author.
    generation: u64,
    tree: Option<(Arc<AuthTree>, Instant)>,
}

pub struct Ledger<S: Store + ?Sized> {
    store: Arc<S>,
    config: LedgerConfig,
    cache: Mutex<HashMap<String, CacheSlot>>,
    writer: tokio::sync::Mutex<()>,
}

impl<S: Store + ?Sized> Ledger<S> {
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        Self {
            store,
            config,
            cache: Mutex::new(HashMap::new()),
            writer: tokio::sync::Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn cache(&self) -> Result<MutexGuard<'_, HashMap<String, CacheSlot>>> {
        self.cache
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    /// Insert a message. Returns `None` for a duplicate.
    ///
    /// Refuses with [`StoreError::TreeCapacityExceeded`] once the author's
    /// tree is full; messages are never silently dropped from a tree.
    pub async fn insert(&self, signed: &SignedMessage) -> Result<Option<StoreRecord>> {
        let _writer = self.writer.lock().await;

        let hash = signed.hash();
        if self.store.has(&hash).await? {
            debug!(%hash, "duplicate message");
            return Ok(None);
        }

        let author = signed.message().author();
        let capacity = AuthTree::capacity_for(self.config.depth);
        let held = self.store.count(&index::author_all(author)).await?;
        if held >= capacity {
            return Err(StoreError::TreeCapacityExceeded {
                author: author.to_string(),
                capacity,
            });
        }

        let inserted = self.store.insert(signed).await?;
        if inserted.is_some() {
            self.invalidate(author)?;
        }
        Ok(inserted)
    }

    /// Drop the cached tree for an author.
    pub fn invalidate(&self, author: &str) -> Result<()> {
        let mut cache = self.cache()?;
        let slot = cache.entry(author.to_string()).or_default();
        slot.generation += 1;
        slot.tree = None;
        Ok(())
    }

    /// The author's tree, from cache when fresh.
    pub async fn tree(&self, author: &str) -> Result<Arc<AuthTree>> {
        let generation = {
            let cache = self.cache()?;
            match cache.get(author) {
                Some(CacheSlot {
                    tree: Some((tree, built)),
                    ..
                }) if built.elapsed() < self.config.cache_ttl => return Ok(Arc::clone(tree)),
                Some(slot) => slot.generation,
                None => 0,
            }
        };

        let leaves = self.store.author_leaves(author).await?;
        let tree = match AuthTree::from_leaves(
            self.config.depth,
            leaves.into_iter().map(TreeHash::from),
        ) {
            Ok(tree) => Arc::new(tree),
            Err(hearsay_core::MerkleError::CapacityExceeded { capacity, .. }) => {
                return Err(StoreError::TreeCapacityExceeded {
                    author: author.to_string(),
                    capacity,
                })
            }
            Err(e) => return Err(e.into()),
        };

        // An insert that landed while building bumped the generation; the
        // tree just built may already be stale, so do not cache it.
        let mut cache = self.cache()?;
        let slot = cache.entry(author.to_string()).or_default();
        if slot.generation == generation {
            slot.tree = Some((Arc::clone(&tree), Instant::now()));
        }
        Ok(tree)
    }

    pub async fn root(&self, author: &str) -> Result<TreeHash> {
        Ok(self.tree(author).await?.root())
    }

    /// The stored message occupying a leaf of the author's tree.
    pub async fn leaf_message(
        &self,
        author: &str,
        leaf_index: usize,
    ) -> Result<Option<StoreRecord>> {
        let tree = self.tree(author).await?;
        match tree.leaves().get(leaf_index) {
            Some(leaf) => self.store.get(&MessageHash::from(*leaf)).await,
            None => Ok(None),
        }
    }

    pub async fn list_authors(&self) -> Result<Vec<String>> {
        self.store.list_authors().await
    }

    pub async fn close(&self) -> Result<()> {
        self.cache()?.clear();
        self.store.close().await
    }
}
