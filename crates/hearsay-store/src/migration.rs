//! Database schema migrations for SQLite.
//!
//! Each migration is a SQL batch that moves the schema from version N to
//! N+1. Applied versions are recorded in `schema_migrations`.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 2;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    } else if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {current} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        2 => apply_v2(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: primary message table and sublevel entries.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Primary map: content hash -> message
        CREATE TABLE messages (
            hash BLOB PRIMARY KEY,            -- 32 bytes, SHA-256 of encoded
            kind INTEGER NOT NULL,
            subkind INTEGER NOT NULL,
            created_at INTEGER NOT NULL,      -- author-claimed epoch ms
            author TEXT NOT NULL,
            encoded BLOB NOT NULL,            -- canonical encoding, raw bytes
            ingested_at INTEGER NOT NULL      -- local time of insert
        );

        -- Secondary indices, one row per (sublevel, entry)
        CREATE TABLE sublevel_entries (
            sublevel TEXT NOT NULL,
            sort_key TEXT NOT NULL,
            hash BLOB NOT NULL,
            PRIMARY KEY (sublevel, sort_key, hash)
        ) WITHOUT ROWID;

        CREATE INDEX idx_messages_author ON messages(author);
        "#,
    )?;

    Ok(())
}

/// Migration v2: keep the author proof beside the message.
fn apply_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        ALTER TABLE messages ADD COLUMN proof_scheme INTEGER;   -- NULL when unsigned
        ALTER TABLE messages ADD COLUMN proof_data BLOB;
        "#,
    )?;

    Ok(())
}

pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"messages".to_string()));
        assert!(tables.contains(&"sublevel_entries".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_proof_columns_present() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO messages (hash, kind, subkind, created_at, author, encoded,
                                   ingested_at, proof_scheme, proof_data)
             VALUES (x'00', 1, 0, 0, 'a', x'00', 0, 0, x'01')",
            [],
        )
        .unwrap();
    }
}
