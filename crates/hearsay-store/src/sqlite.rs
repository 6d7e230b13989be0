//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use hearsay_core::{Message, MessageHash, Proof, ProofScheme, SignedMessage};

use crate::error::{Result, StoreError};
use crate::index::{self, IndexEntry, AUTHOR_LIST};
use crate::migration::{self, now_millis};
use crate::traits::{ScanOptions, Store, StoreRecord};

/// SQLite-based store implementation.
///
/// Thread-safe via an internal Mutex, which is also the insert critical
/// section. `None` inside the mutex means the store was closed.
pub struct SqliteStore {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        debug!(path = %path.display(), "opened sqlite store");
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        }
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            let conn = guard.as_mut().ok_or(StoreError::Closed)?;
            f(conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn hash_from_blob(bytes: Vec<u8>) -> Result<MessageHash> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| StoreError::InvalidData(format!("hash of {} bytes", b.len())))?;
    Ok(MessageHash::from_bytes(arr))
}

fn entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, Vec<u8>)> {
    Ok((row.get(0)?, row.get(1)?))
}

fn record_from_parts(
    hash: &MessageHash,
    encoded: Vec<u8>,
    proof_scheme: Option<i64>,
    proof_data: Option<Vec<u8>>,
) -> Result<StoreRecord> {
    let message = Message::from_bytes(&encoded)?;
    if message.hash() != *hash {
        return Err(StoreError::InvalidData(format!(
            "stored message {} hashes to {}",
            hash,
            message.hash()
        )));
    }

    let proof = match (proof_scheme, proof_data) {
        (Some(code), Some(data)) => {
            let scheme = u8::try_from(code)
                .ok()
                .and_then(ProofScheme::from_u8)
                .ok_or_else(|| StoreError::InvalidData(format!("proof scheme {code}")))?;
            Some(Proof::new(scheme, data)?)
        }
        _ => None,
    };

    Ok(StoreRecord::new(message, proof))
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert(&self, signed: &SignedMessage) -> Result<Option<StoreRecord>> {
        let message = signed.message().clone();
        let proof = signed.proof().cloned();

        self.blocking(move |conn| {
            let hash = message.hash();
            let tx = conn.transaction()?;

            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM messages WHERE hash = ?1)",
                params![hash.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            if exists {
                return Ok(None);
            }

            tx.execute(
                "INSERT INTO messages (
                    hash, kind, subkind, created_at, author, encoded,
                    ingested_at, proof_scheme, proof_data
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    hash.as_bytes().as_slice(),
                    message.kind().to_u8() as i64,
                    message.subkind() as i64,
                    message.created_at() as i64,
                    message.author(),
                    message.as_bytes(),
                    now_millis(),
                    proof.as_ref().map(|p| p.scheme().to_u8() as i64),
                    proof.as_ref().map(|p| p.data()),
                ],
            )?;

            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR IGNORE INTO sublevel_entries (sublevel, sort_key, hash)
                     VALUES (?1, ?2, ?3)",
                )?;
                for (sublevel, entry) in index::entries_for(&message) {
                    stmt.execute(params![
                        sublevel,
                        entry.sort_key,
                        entry.hash.as_bytes().as_slice()
                    ])?;
                }
            }

            tx.commit()?;
            Ok(Some(StoreRecord::new(message, proof)))
        })
        .await
    }

    async fn get(&self, hash: &MessageHash) -> Result<Option<StoreRecord>> {
        let hash = *hash;

        self.blocking(move |conn| {
            let row = conn
                .query_row(
                    "SELECT encoded, proof_scheme, proof_data FROM messages WHERE hash = ?1",
                    params![hash.as_bytes().as_slice()],
                    |row| {
                        Ok((
                            row.get::<_, Vec<u8>>(0)?,
                            row.get::<_, Option<i64>>(1)?,
                            row.get::<_, Option<Vec<u8>>>(2)?,
                        ))
                    },
                )
                .optional()?;

            row.map(|(encoded, scheme, data)| record_from_parts(&hash, encoded, scheme, data))
                .transpose()
        })
        .await
    }

    async fn has(&self, hash: &MessageHash) -> Result<bool> {
        let hash = *hash;

        self.blocking(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM messages WHERE hash = ?1)",
                params![hash.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn scan(&self, sublevel: &str, options: ScanOptions) -> Result<Vec<IndexEntry>> {
        let sublevel = sublevel.to_string();

        self.blocking(move |conn| {
            let order = if options.reverse { "DESC" } else { "ASC" };
            let limit = options.limit.map_or(-1, |l| l as i64);

            let rows = match &options.after {
                None => {
                    let sql = format!(
                        "SELECT sort_key, hash FROM sublevel_entries
                         WHERE sublevel = ?1
                         ORDER BY sort_key {order}, hash {order} LIMIT ?2"
                    );
                    let mut stmt = conn.prepare_cached(&sql)?;
                    let rows = stmt
                        .query_map(params![sublevel, limit], entry_row)?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    rows
                }
                Some(after) => {
                    let cmp = if options.reverse { "<" } else { ">" };
                    let sql = format!(
                        "SELECT sort_key, hash FROM sublevel_entries
                         WHERE sublevel = ?1 AND (sort_key, hash) {cmp} (?2, ?3)
                         ORDER BY sort_key {order}, hash {order} LIMIT ?4"
                    );
                    let mut stmt = conn.prepare_cached(&sql)?;
                    let rows = stmt
                        .query_map(
                            params![
                                sublevel,
                                after.sort_key,
                                after.hash.as_bytes().as_slice(),
                                limit
                            ],
                            entry_row,
                        )?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    rows
                }
            };

            rows.into_iter()
                .map(|(sort_key, hash)| Ok(IndexEntry::new(sort_key, hash_from_blob(hash)?)))
                .collect()
        })
        .await
    }

    async fn count(&self, sublevel: &str) -> Result<usize> {
        let sublevel = sublevel.to_string();

        self.blocking(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sublevel_entries WHERE sublevel = ?1",
                params![sublevel],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    async fn len(&self) -> Result<usize> {
        self.blocking(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    async fn list_authors(&self) -> Result<Vec<String>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT sort_key FROM sublevel_entries WHERE sublevel = ?1 ORDER BY sort_key",
            )?;
            let authors = stmt
                .query_map(params![AUTHOR_LIST], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(authors)
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            match guard.take() {
                Some(conn) => conn.close().map_err(|(_, e)| StoreError::Database(e)),
                None => Ok(()),
            }
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearsay_core::{
        ConnectionKind, ConnectionPayload, Keypair, PostKind, PostPayload, ProfileKind,
        ProfilePayload, ProofSigner,
    };

    fn make_test_message(keypair: &Keypair, n: u64) -> SignedMessage {
        let message = Message::new(
            keypair.author(),
            1_000 + n,
            PostPayload::new(PostKind::Default).with_body(format!("test post {n}")),
        )
        .unwrap();
        SignedMessage::sign(message, keypair)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = SqliteStore::open_memory().unwrap();
        let keypair = Keypair::generate();
        let signed = make_test_message(&keypair, 1);

        let record = store.insert(&signed).await.unwrap().unwrap();
        assert_eq!(record.hash, signed.hash());

        let fetched = store.get(&signed.hash()).await.unwrap().unwrap();
        assert_eq!(fetched.message, *signed.message());
        assert_eq!(fetched.proof.as_ref(), signed.proof());
        assert!(store.has(&signed.hash()).await.unwrap());
        assert!(store.get(&MessageHash::ZERO).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_idempotent_insert() {
        let store = SqliteStore::open_memory().unwrap();
        let keypair = Keypair::generate();
        let signed = make_test_message(&keypair, 1);

        assert!(store.insert(&signed).await.unwrap().is_some());
        assert!(store.insert(&signed).await.unwrap().is_none());
        assert_eq!(store.len().await.unwrap(), 1);
        assert_eq!(store.count("global/post").await.unwrap(), 1);
        assert_eq!(store.count(&index::author_all(&keypair.author())).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unsigned_message_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let message = Message::new(
            "alice",
            7,
            ProfilePayload::new(ProfileKind::Name, "Alice"),
        )
        .unwrap();
        store.insert(&SignedMessage::unsigned(message.clone())).await.unwrap();

        let fetched = store.get(&message.hash()).await.unwrap().unwrap();
        assert_eq!(fetched.message, message);
        assert!(fetched.proof.is_none());
        assert_eq!(store.count("profile/alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scan_matches_memory_order() {
        let sqlite = SqliteStore::open_memory().unwrap();
        let memory = crate::memory::MemoryStore::new();
        for n in 0..6u64 {
            let message = Message::new(
                format!("user{}", n % 3),
                100 + n / 2,
                ConnectionPayload::new(ConnectionKind::Follow, "target"),
            )
            .unwrap();
            let signed = SignedMessage::unsigned(message);
            sqlite.insert(&signed).await.unwrap();
            memory.insert(&signed).await.unwrap();
        }

        for reverse in [false, true] {
            let options = ScanOptions {
                reverse,
                ..Default::default()
            };
            let a = sqlite.scan("connection/target", options.clone()).await.unwrap();
            let b = memory.scan("connection/target", options).await.unwrap();
            assert_eq!(a, b);

            let cursor = ScanOptions {
                reverse,
                after: Some(a[2].clone()),
                limit: Some(2),
            };
            assert_eq!(
                sqlite.scan("connection/target", cursor.clone()).await.unwrap(),
                memory.scan("connection/target", cursor).await.unwrap()
            );
        }
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hearsay.db");
        let keypair = Keypair::generate();
        let signed = make_test_message(&keypair, 1);

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert(&signed).await.unwrap();
            store.close().await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.has(&signed.hash()).await.unwrap());
        assert_eq!(store.list_authors().await.unwrap(), vec![keypair.author()]);
    }

    #[tokio::test]
    async fn test_closed_store_rejects_calls() {
        let store = SqliteStore::open_memory().unwrap();
        store.close().await.unwrap();
        store.close().await.unwrap();
        assert!(matches!(store.len().await, Err(StoreError::Closed)));
    }
}
