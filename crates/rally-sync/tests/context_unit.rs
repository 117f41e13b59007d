// crates/rally-sync/tests/context_unit.rs
// ============================================================================
// Module: Rally Context Unit Tests
// Description: Startup ordering of migration and the reminder scheduler.
// Purpose: Ensure migrated state is in place before the first reminder poll.
// ============================================================================

//! ## Overview
//! Opens a [`RallyContext`] over a temporary `SQLite` file. The presenter
//! reads the migration flag through its own connection at presentation time,
//! which shows whether the migration finished before the start-up poll.

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

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use rally_config::RallyConfig;
use rally_core::InMemoryKvStore;
use rally_core::KeyValueStore;
use rally_core::Recurrence;
use rally_core::ReminderEvent;
use rally_core::ReminderKind;
use rally_core::ReminderRule;
use rally_core::Timestamp;
use rally_store_sqlite::SqliteDatabase;
use rally_store_sqlite::SqliteKvStore;
use rally_store_sqlite::SqliteStoreConfig;
use rally_sync::MIGRATION_FLAG_KEY;
use rally_sync::MigrationOutcome;
use rally_sync::PresentError;
use rally_sync::RallyContext;
use rally_sync::ReminderPresenter;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Records, for each presented reminder, the migration flag seen at that time.
struct FlagReadingPresenter {
    kv: SqliteKvStore,
    flags: Mutex<Vec<Option<String>>>,
}

impl FlagReadingPresenter {
    fn new(path: &Path) -> Arc<Self> {
        let db = SqliteDatabase::new(SqliteStoreConfig::for_path(path)).unwrap();
        Arc::new(Self {
            kv: SqliteKvStore::new(db),
            flags: Mutex::new(Vec::new()),
        })
    }

    fn flags(&self) -> Vec<Option<String>> {
        self.flags.lock().unwrap().clone()
    }
}

impl ReminderPresenter for FlagReadingPresenter {
    fn present(&self, _event: &ReminderEvent) -> Result<(), PresentError> {
        let flag = self.kv.get(MIGRATION_FLAG_KEY).unwrap();
        self.flags.lock().unwrap().push(flag);
        Ok(())
    }
}

fn config_for(path: &Path) -> RallyConfig {
    RallyConfig {
        store: SqliteStoreConfig::for_path(path),
        ..RallyConfig::default()
    }
}

fn overdue_rule(id: &str) -> ReminderRule {
    ReminderRule::new(
        id,
        ReminderKind::Custom,
        "Overdue",
        "overdue reminder",
        Timestamp::now().add_millis(-60_000),
        Recurrence::Once,
    )
}

async fn wait_for_presentations(presenter: &FlagReadingPresenter, count: usize) {
    for _ in 0 .. 200 {
        if presenter.flags().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {count} presentations, saw {:?}", presenter.flags());
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[tokio::test]
async fn start_migrates_before_first_poll() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rally.sqlite");
    let presenter = FlagReadingPresenter::new(&path);
    let context = RallyContext::open(&config_for(&path), presenter.clone()).unwrap();
    context.scheduler().schedule(&overdue_rule("due")).unwrap();

    let legacy: Arc<dyn KeyValueStore> =
        Arc::new(InMemoryKvStore::with_entries(vec![("theme".to_string(), "dark".to_string())]));
    let startup = context.start(Some(legacy));
    assert_eq!(
        startup.migration,
        Some(MigrationOutcome::Migrated {
            entries: 1
        })
    );

    wait_for_presentations(&presenter, 1).await;
    assert_eq!(presenter.flags(), vec![Some("true".to_string())]);
    assert_eq!(context.kv().get("theme").unwrap().as_deref(), Some("dark"));

    startup.scheduler.shutdown().await;
}

#[tokio::test]
async fn start_without_legacy_store_skips_migration() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rally.sqlite");
    let presenter = FlagReadingPresenter::new(&path);
    let context = RallyContext::open(&config_for(&path), presenter.clone()).unwrap();
    context.scheduler().schedule(&overdue_rule("due")).unwrap();

    let startup = context.start(None);
    assert_eq!(startup.migration, None);

    wait_for_presentations(&presenter, 1).await;
    assert_eq!(presenter.flags(), vec![None]);

    startup.scheduler.shutdown().await;
}
