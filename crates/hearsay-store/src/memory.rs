//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use hearsay_core::{MessageHash, SignedMessage};

use crate::error::{Result, StoreError};
use crate::index::{self, IndexEntry, AUTHOR_LIST};
use crate::traits::{ScanOptions, Store, StoreRecord};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; the
/// write guard is the insert critical section.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Records by content hash.
    records: HashMap<MessageHash, StoreRecord>,

    /// Sublevel name -> ordered entries.
    sublevels: HashMap<String, BTreeSet<IndexEntry>>,

    closed: bool,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        if inner.closed {
            return Err(StoreError::Closed);
        }
        Ok(inner)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        let inner = self
            .inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        if inner.closed {
            return Err(StoreError::Closed);
        }
        Ok(inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert(&self, signed: &SignedMessage) -> Result<Option<StoreRecord>> {
        let mut inner = self.write()?;

        let hash = signed.hash();
        if inner.records.contains_key(&hash) {
            return Ok(None);
        }

        for (sublevel, entry) in index::entries_for(signed.message()) {
            inner.sublevels.entry(sublevel).or_default().insert(entry);
        }
        let record = StoreRecord::new(signed.message().clone(), signed.proof().cloned());
        inner.records.insert(hash, record.clone());

        Ok(Some(record))
    }

    async fn get(&self, hash: &MessageHash) -> Result<Option<StoreRecord>> {
        let inner = self.read()?;
        Ok(inner.records.get(hash).cloned())
    }

    async fn has(&self, hash: &MessageHash) -> Result<bool> {
        let inner = self.read()?;
        Ok(inner.records.contains_key(hash))
    }

    async fn scan(&self, sublevel: &str, options: ScanOptions) -> Result<Vec<IndexEntry>> {
        let inner = self.read()?;
        let Some(entries) = inner.sublevels.get(sublevel) else {
            return Ok(Vec::new());
        };
        let limit = options.limit.unwrap_or(usize::MAX);

        let scanned: Vec<IndexEntry> = match (&options.after, options.reverse) {
            (None, false) => entries.iter().take(limit).cloned().collect(),
            (None, true) => entries.iter().rev().take(limit).cloned().collect(),
            (Some(after), false) => entries
                .range((Bound::Excluded(after), Bound::Unbounded))
                .take(limit)
                .cloned()
                .collect(),
            (Some(after), true) => entries
                .range((Bound::Unbounded, Bound::Excluded(after)))
                .rev()
                .take(limit)
                .cloned()
                .collect(),
        };
        Ok(scanned)
    }

    async fn count(&self, sublevel: &str) -> Result<usize> {
        let inner = self.read()?;
        Ok(inner.sublevels.get(sublevel).map_or(0, BTreeSet::len))
    }

    async fn len(&self) -> Result<usize> {
        let inner = self.read()?;
        Ok(inner.records.len())
    }

    async fn list_authors(&self) -> Result<Vec<String>> {
        let inner = self.read()?;
        Ok(inner
            .sublevels
            .get(AUTHOR_LIST)
            .map(|authors| authors.iter().map(|e| e.sort_key.clone()).collect())
            .unwrap_or_default())
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        inner.closed = true;
        inner.records.clear();
        inner.sublevels.clear();
        Ok(())
    }
}
