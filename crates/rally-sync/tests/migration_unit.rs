// crates/rally-sync/tests/migration_unit.rs
// ============================================================================
// Module: Migration Unit Tests
// Description: One-shot copy of legacy key/value state.
// Purpose: Validate idempotence, failure retry, and storage maintenance.
// ============================================================================

//! ## Overview
//! Exercises [`MigrationManager`] against in-memory legacy stores and both
//! in-memory and `SQLite` targets.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use rally_core::InMemoryKvStore;
use rally_core::KeyValueStore;
use rally_core::StorageError;
use rally_store_sqlite::SqliteDatabase;
use rally_store_sqlite::SqliteKvStore;
use rally_store_sqlite::SqliteStoreConfig;
use rally_sync::MIGRATION_FLAG_KEY;
use rally_sync::MigrationManager;
use rally_sync::MigrationOutcome;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Wraps a store, counting reads and optionally failing batch writes.
struct InstrumentedStore {
    inner: InMemoryKvStore,
    reads: AtomicUsize,
    fail_batches: AtomicBool,
}

impl InstrumentedStore {
    fn new(inner: InMemoryKvStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            reads: AtomicUsize::new(0),
            fail_batches: AtomicBool::new(false),
        })
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl KeyValueStore for InstrumentedStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.inner.clear()
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.keys()
    }

    fn get_many(&self, keys: &[String]) -> Result<Vec<(String, Option<String>)>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_many(keys)
    }

    fn set_many(&self, pairs: &[(String, String)]) -> Result<(), StorageError> {
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(StorageError::Db("disk full".to_string()));
        }
        self.inner.set_many(pairs)
    }

    fn remove_many(&self, keys: &[String]) -> Result<(), StorageError> {
        self.inner.remove_many(keys)
    }
}

fn legacy_state() -> InMemoryKvStore {
    InMemoryKvStore::with_entries([
        ("user_profile", r#"{"name":"Ana","level":"intermediate"}"#),
        ("workout_history", "[]"),
        ("settings", r#"{"reminders":true}"#),
    ])
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn first_run_copies_entries_and_sets_flag() {
    let legacy: Arc<dyn KeyValueStore> = Arc::new(legacy_state());
    let target = Arc::new(InMemoryKvStore::new());
    let manager = MigrationManager::new(legacy, target.clone());

    assert!(!manager.is_migration_complete());
    assert_eq!(
        manager.migrate(),
        MigrationOutcome::Migrated {
            entries: 3
        }
    );
    assert!(manager.is_migration_complete());
    assert_eq!(target.get(MIGRATION_FLAG_KEY).unwrap().as_deref(), Some("true"));
    assert_eq!(target.get("workout_history").unwrap().as_deref(), Some("[]"));
    assert_eq!(target.len(), 4);
}

#[test]
fn second_run_never_reads_legacy() {
    let legacy = InstrumentedStore::new(legacy_state());
    let target = Arc::new(InMemoryKvStore::new());
    let manager = MigrationManager::new(legacy.clone(), target.clone());

    assert!(matches!(manager.migrate(), MigrationOutcome::Migrated { .. }));
    let reads_after_first = legacy.reads();
    legacy.set("settings", r#"{"reminders":false}"#).unwrap();

    let again = MigrationManager::new(legacy.clone(), target.clone());
    assert_eq!(again.migrate(), MigrationOutcome::AlreadyMigrated);
    assert!(again.is_migration_complete());
    assert_eq!(legacy.reads(), reads_after_first);
    assert_eq!(target.get("settings").unwrap().as_deref(), Some(r#"{"reminders":true}"#));
}

#[test]
fn empty_legacy_still_marks_complete() {
    let legacy: Arc<dyn KeyValueStore> = Arc::new(InMemoryKvStore::new());
    let target = Arc::new(InMemoryKvStore::new());
    let manager = MigrationManager::new(legacy, target.clone());

    assert_eq!(
        manager.migrate(),
        MigrationOutcome::Migrated {
            entries: 0
        }
    );
    assert_eq!(target.keys().unwrap(), vec![MIGRATION_FLAG_KEY.to_string()]);
}

#[test]
fn failed_copy_leaves_flag_unset_and_retries() {
    let legacy: Arc<dyn KeyValueStore> = Arc::new(legacy_state());
    let target = InstrumentedStore::new(InMemoryKvStore::new());
    target.fail_batches.store(true, Ordering::SeqCst);
    let manager = MigrationManager::new(Arc::clone(&legacy), target.clone());

    match manager.migrate() {
        MigrationOutcome::Failed {
            reason,
        } => assert!(reason.contains("disk full"), "unexpected reason: {reason}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!manager.is_migration_complete());
    assert_eq!(target.get(MIGRATION_FLAG_KEY).unwrap(), None);

    target.fail_batches.store(false, Ordering::SeqCst);
    assert_eq!(
        manager.migrate(),
        MigrationOutcome::Migrated {
            entries: 3
        }
    );
}

#[test]
fn migrates_into_sqlite_and_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rally.sqlite");
    let open = || {
        let db = SqliteDatabase::new(SqliteStoreConfig::for_path(&path)).unwrap();
        Arc::new(SqliteKvStore::new(db))
    };
    let legacy: Arc<dyn KeyValueStore> = Arc::new(legacy_state());

    let first = MigrationManager::new(Arc::clone(&legacy), open());
    assert!(matches!(first.migrate(), MigrationOutcome::Migrated { entries: 3 }));

    let reopened = open();
    let second = MigrationManager::new(legacy, reopened.clone());
    assert_eq!(second.migrate(), MigrationOutcome::AlreadyMigrated);
    assert_eq!(reopened.get("user_profile").unwrap().as_deref(), Some(r#"{"name":"Ana","level":"intermediate"}"#));
}

#[test]
fn storage_stats_and_clear_all() {
    let legacy: Arc<dyn KeyValueStore> = Arc::new(legacy_state());
    let target = Arc::new(InMemoryKvStore::new());
    let manager = MigrationManager::new(legacy, target.clone());
    manager.migrate();

    let stats = manager.storage_stats().unwrap();
    assert_eq!(stats.item_count, 4);
    assert_eq!(
        stats.keys,
        vec![
            MIGRATION_FLAG_KEY.to_string(),
            "settings".to_string(),
            "user_profile".to_string(),
            "workout_history".to_string(),
        ]
    );

    manager.clear_all_storage().unwrap();
    assert!(target.is_empty());
    assert!(!manager.is_migration_complete());
    assert_eq!(manager.storage_stats().unwrap().item_count, 0);
}
