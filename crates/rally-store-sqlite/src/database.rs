// crates/rally-store-sqlite/src/database.rs
// ============================================================================
// Module: SQLite Database Handle
// Description: Lazily opened, shared SQLite connection with schema bootstrap.
// Purpose: Own the single storage handle used by every Rally store.
// Dependencies: rally-core, rusqlite, serde, tracing
// ============================================================================

//! ## Overview
//! [`SqliteDatabase`] validates its configuration up front but defers opening
//! the connection until the first statement. Opening applies durability
//! pragmas and creates the schema with `IF NOT EXISTS` statements, so it is
//! safe on every process start. The connection lives until the last clone of
//! the handle is dropped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use rally_core::StorageError;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use tracing::debug;
use tracing::info;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default database file name.
pub const DEFAULT_STORE_PATH: &str = "rally.sqlite";
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` database.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a configuration for `path` with default tuning.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl Default for SqliteStoreConfig {
    fn default() -> Self {
        Self::for_path(DEFAULT_STORE_PATH)
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Database Handle
// ============================================================================

/// Shared, lazily opened `SQLite` connection.
///
/// # Invariants
/// - At most one connection is opened per handle (and its clones).
/// - Statement execution is serialized through a mutex.
/// - The schema exists whenever the connection is observable to callers.
#[derive(Clone)]
pub struct SqliteDatabase {
    /// Database configuration.
    config: Arc<SqliteStoreConfig>,
    /// Connection slot, filled on first use.
    connection: Arc<Mutex<Option<Connection>>>,
}

impl SqliteDatabase {
    /// Creates a handle for `config` without opening the database.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Invalid`] when the configured path is unusable.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, StorageError> {
        validate_store_path(&config.path)?;
        Ok(Self {
            config: Arc::new(config),
            connection: Arc::new(Mutex::new(None)),
        })
    }

    /// Returns the database configuration.
    #[must_use]
    pub fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Opens the connection if needed and verifies it answers a trivial query.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the database cannot be opened or queried.
    pub fn readiness(&self) -> Result<(), StorageError> {
        self.with_connection(|connection| {
            connection.execute_batch("SELECT 1").map_err(|err| StorageError::Db(err.to_string()))
        })
    }

    /// Runs `op` against the shared connection, opening it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the mutex is poisoned, the database
    /// cannot be opened, or `op` fails.
    pub fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut slot = self
            .connection
            .lock()
            .map_err(|_| StorageError::Io("sqlite mutex poisoned".to_string()))?;
        if slot.is_none() {
            *slot = Some(open_database(&self.config)?);
        }
        match slot.as_mut() {
            Some(connection) => op(connection),
            None => Err(StorageError::Io("sqlite connection unavailable".to_string())),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), StorageError> {
    if path.as_os_str().is_empty() {
        return Err(StorageError::Invalid("store path must not be empty".to_string()));
    }
    if path.display().to_string().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(StorageError::Invalid("store path exceeds length limit".to_string()));
    }
    if path.exists() && path.is_dir() {
        return Err(StorageError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), StorageError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|err| StorageError::Io(err.to_string()))
        }
        _ => Ok(()),
    }
}

/// Opens the database file, applies pragmas, and bootstraps the schema.
fn open_database(config: &SqliteStoreConfig) -> Result<Connection, StorageError> {
    ensure_parent_dir(&config.path)?;
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let mut connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| StorageError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    initialize_schema(&mut connection)?;
    debug!(path = %config.path.display(), "sqlite database opened");
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(connection: &Connection, config: &SqliteStoreConfig) -> Result<(), StorageError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| StorageError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| StorageError::Db(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| StorageError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), StorageError> {
    let tx = connection.transaction().map_err(|err| StorageError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| StorageError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| StorageError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| StorageError::Db(err.to_string()))?;
            info!(version = SCHEMA_VERSION, "sqlite schema created");
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(StorageError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            type TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            scheduled_time INTEGER NOT NULL,
            recurring INTEGER NOT NULL DEFAULT 0,
            recurring_pattern TEXT,
            enabled INTEGER NOT NULL DEFAULT 1,
            last_shown INTEGER,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_notifications_time
            ON notifications (scheduled_time);",
    )
    .map_err(|err| StorageError::Db(err.to_string()))?;
    tx.commit().map_err(|err| StorageError::Db(err.to_string()))?;
    Ok(())
}
