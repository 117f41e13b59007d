// crates/rally-store-sqlite/src/kv.rs
// ============================================================================
// Module: SQLite Key/Value Store
// Description: Durable KeyValueStore backed by the `kv_store` table.
// Purpose: Persist application state with upsert and transactional batches.
// Dependencies: rally-core, rusqlite, tracing
// ============================================================================

//! ## Overview
//! Every write is an upsert that also stamps `updated_at`. Batch writes and
//! batch removals run in a single transaction, so a failure part-way through
//! leaves the table as it was before the call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rally_core::KeyValueStore;
use rally_core::StorageError;
use rally_core::Timestamp;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use tracing::debug;

use crate::database::SqliteDatabase;

// ============================================================================
// SECTION: Statements
// ============================================================================

/// Upsert statement shared by single and batch writes.
const UPSERT_SQL: &str = "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";

// ============================================================================
// SECTION: Store
// ============================================================================

/// Key/value store persisted in `SQLite`.
///
/// # Invariants
/// - Shares its connection with every other store built on the same handle.
#[derive(Clone)]
pub struct SqliteKvStore {
    /// Shared database handle.
    db: SqliteDatabase,
}

impl SqliteKvStore {
    /// Creates a key/value store over `db`.
    #[must_use]
    pub const fn new(db: SqliteDatabase) -> Self {
        Self {
            db,
        }
    }

    /// Returns the underlying database handle.
    #[must_use]
    pub const fn database(&self) -> &SqliteDatabase {
        &self.db
    }

    /// Returns the number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the query fails.
    pub fn len(&self) -> Result<usize, StorageError> {
        self.db.with_connection(|connection| {
            let count: i64 = connection
                .query_row("SELECT COUNT(*) FROM kv_store", params![], |row| row.get(0))
                .map_err(|err| StorageError::Db(err.to_string()))?;
            usize::try_from(count).map_err(|_| StorageError::Invalid("negative row count".to_string()))
        })
    }

    /// Returns true when the store holds no entries.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the query fails.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl KeyValueStore for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.db.with_connection(|connection| read_value(connection, key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let now = Timestamp::now().as_unix_millis();
        self.db.with_connection(|connection| {
            connection
                .execute(UPSERT_SQL, params![key, value, now])
                .map_err(|err| StorageError::Db(err.to_string()))?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.db.with_connection(|connection| {
            connection
                .execute("DELETE FROM kv_store WHERE key = ?1", params![key])
                .map_err(|err| StorageError::Db(err.to_string()))?;
            Ok(())
        })
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.db.with_connection(|connection| {
            let removed = connection
                .execute("DELETE FROM kv_store", params![])
                .map_err(|err| StorageError::Db(err.to_string()))?;
            debug!(removed, "kv store cleared");
            Ok(())
        })
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.db.with_connection(|connection| {
            let mut stmt = connection
                .prepare("SELECT key FROM kv_store ORDER BY key")
                .map_err(|err| StorageError::Db(err.to_string()))?;
            let rows = stmt
                .query_map(params![], |row| row.get::<_, String>(0))
                .map_err(|err| StorageError::Db(err.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|err| StorageError::Db(err.to_string()))
        })
    }

    fn get_many(&self, keys: &[String]) -> Result<Vec<(String, Option<String>)>, StorageError> {
        self.db.with_connection(|connection| {
            let connection: &Connection = connection;
            keys.iter()
                .map(|key| Ok((key.clone(), read_value(connection, key)?)))
                .collect()
        })
    }

    fn set_many(&self, pairs: &[(String, String)]) -> Result<(), StorageError> {
        if pairs.is_empty() {
            return Ok(());
        }
        let now = Timestamp::now().as_unix_millis();
        self.db.with_connection(|connection| {
            let tx = connection.transaction().map_err(|err| StorageError::Db(err.to_string()))?;
            {
                let mut stmt =
                    tx.prepare(UPSERT_SQL).map_err(|err| StorageError::Db(err.to_string()))?;
                for (key, value) in pairs {
                    stmt.execute(params![key, value, now])
                        .map_err(|err| StorageError::Db(err.to_string()))?;
                }
            }
            tx.commit().map_err(|err| StorageError::Db(err.to_string()))?;
            debug!(count = pairs.len(), "kv batch written");
            Ok(())
        })
    }

    fn remove_many(&self, keys: &[String]) -> Result<(), StorageError> {
        if keys.is_empty() {
            return Ok(());
        }
        self.db.with_connection(|connection| {
            let tx = connection.transaction().map_err(|err| StorageError::Db(err.to_string()))?;
            {
                let mut stmt = tx
                    .prepare("DELETE FROM kv_store WHERE key = ?1")
                    .map_err(|err| StorageError::Db(err.to_string()))?;
                for key in keys {
                    stmt.execute(params![key]).map_err(|err| StorageError::Db(err.to_string()))?;
                }
            }
            tx.commit().map_err(|err| StorageError::Db(err.to_string()))?;
            Ok(())
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads one value by key.
fn read_value(connection: &Connection, key: &str) -> Result<Option<String>, StorageError> {
    connection
        .query_row("SELECT value FROM kv_store WHERE key = ?1", params![key], |row| row.get(0))
        .optional()
        .map_err(|err| StorageError::Db(err.to_string()))
}
