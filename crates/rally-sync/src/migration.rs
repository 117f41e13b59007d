// crates/rally-sync/src/migration.rs
// ============================================================================
// Module: Storage Migration
// Description: One-shot copy of a legacy key/value store into the durable one.
// Purpose: Carry existing user state across the storage backend switch.
// Dependencies: rally-core, tracing
// ============================================================================

//! ## Overview
//! Migration is guarded by a flag entry in the target store. Once the flag
//! reads `"true"` every later call is a no-op that never touches the legacy
//! store. Failures are logged and reported as [`MigrationOutcome::Failed`]
//! without setting the flag, so the next start retries; the retry is safe
//! because the batch write is an upsert.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use rally_core::KeyValueStore;
use rally_core::StorageError;
use tracing::info;
use tracing::warn;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Flag key marking migration complete.
pub const MIGRATION_FLAG_KEY: &str = "STORAGE_MIGRATED_TO_SQLITE";
/// Flag value marking migration complete.
const MIGRATION_FLAG_DONE: &str = "true";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Result of a migration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The flag was already set; nothing was read or written.
    AlreadyMigrated,
    /// Entries were copied and the flag was set.
    Migrated {
        /// Number of entries copied.
        entries: usize,
    },
    /// A step failed; the flag was not set.
    Failed {
        /// Failure description.
        reason: String,
    },
}

/// Snapshot of the durable store contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of stored entries.
    pub item_count: usize,
    /// Stored keys in ascending order.
    pub keys: Vec<String>,
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Copies legacy state into the durable store once.
pub struct MigrationManager {
    /// Source store.
    legacy: Arc<dyn KeyValueStore>,
    /// Destination store.
    target: Arc<dyn KeyValueStore>,
    /// Set once this process observed a completed migration.
    complete: AtomicBool,
}

impl MigrationManager {
    /// Creates a manager copying `legacy` into `target`.
    #[must_use]
    pub fn new(legacy: Arc<dyn KeyValueStore>, target: Arc<dyn KeyValueStore>) -> Self {
        Self {
            legacy,
            target,
            complete: AtomicBool::new(false),
        }
    }

    /// Runs the migration if it has not completed yet.
    pub fn migrate(&self) -> MigrationOutcome {
        match self.target.get(MIGRATION_FLAG_KEY) {
            Ok(Some(flag)) if flag == MIGRATION_FLAG_DONE => {
                self.complete.store(true, Ordering::Release);
                return MigrationOutcome::AlreadyMigrated;
            }
            Ok(_) => {}
            Err(err) => return failed(&err),
        }
        match self.copy_entries() {
            Ok(entries) => {
                self.complete.store(true, Ordering::Release);
                info!(entries, "storage migration completed");
                MigrationOutcome::Migrated {
                    entries,
                }
            }
            Err(err) => failed(&err),
        }
    }

    /// Returns true once this process has seen the migration complete.
    #[must_use]
    pub fn is_migration_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Summarizes the durable store.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store cannot be listed.
    pub fn storage_stats(&self) -> Result<StorageStats, StorageError> {
        let keys = self.target.keys()?;
        Ok(StorageStats {
            item_count: keys.len(),
            keys,
        })
    }

    /// Clears the durable store, including the migration flag.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store cannot be cleared.
    pub fn clear_all_storage(&self) -> Result<(), StorageError> {
        self.target.clear()?;
        self.complete.store(false, Ordering::Release);
        info!("durable storage cleared");
        Ok(())
    }

    /// Copies every legacy entry, then sets the flag.
    fn copy_entries(&self) -> Result<usize, StorageError> {
        let keys = self.legacy.keys()?;
        let mut pairs = Vec::with_capacity(keys.len());
        if !keys.is_empty() {
            for (key, value) in self.legacy.get_many(&keys)? {
                if let Some(value) = value {
                    pairs.push((key, value));
                }
            }
            self.target.set_many(&pairs)?;
        }
        self.target.set(MIGRATION_FLAG_KEY, MIGRATION_FLAG_DONE)?;
        Ok(pairs.len())
    }
}

/// Logs and wraps a migration failure.
fn failed(err: &StorageError) -> MigrationOutcome {
    warn!(error = %err, "storage migration failed; will retry on next start");
    MigrationOutcome::Failed {
        reason: err.to_string(),
    }
}
