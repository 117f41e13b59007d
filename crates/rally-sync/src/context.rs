// crates/rally-sync/src/context.rs
// ============================================================================
// Module: Rally Context
// Description: Startup wiring of stores, cache, fetcher, and scheduler.
// Purpose: Build one process-wide set of services from configuration.
// Dependencies: rally-config, rally-core, rally-fetch, rally-store-sqlite
// ============================================================================

//! ## Overview
//! [`RallyContext::open`] is the single place where concrete backends are
//! chosen: the `SQLite` database backs both the key/value store and the
//! reminder table, the response cache uses the system clock, and outbound
//! requests go through `reqwest`. Everything else in the crate depends only
//! on the `rally-core` traits.
//!
//! The store is opened lazily; [`RallyContext::open`] fails only on an
//! invalid store path or transport construction error.
//!
//! [`RallyContext::start`] encodes the startup order: the legacy migration
//! runs to completion before the scheduler's first poll, so reminders and
//! preferences copied from the legacy store are visible to it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use rally_config::ConfigError;
use rally_config::RallyConfig;
use rally_core::Clock;
use rally_core::KeyValueStore;
use rally_core::ReminderStore;
use rally_core::StorageError;
use rally_core::SystemClock;
use rally_fetch::FetchClient;
use rally_fetch::FetchError;
use rally_fetch::ReqwestTransport;
use rally_fetch::RetryConfig;
use rally_store_sqlite::SqliteDatabase;
use rally_store_sqlite::SqliteKvStore;
use rally_store_sqlite::SqliteReminderStore;
use thiserror::Error;
use tracing::info;

use crate::cache::ResponseCache;
use crate::fetcher::CachedJsonFetcher;
use crate::migration::MigrationManager;
use crate::migration::MigrationOutcome;
use crate::scheduler::ReminderPresenter;
use crate::scheduler::ReminderScheduler;
use crate::scheduler::SchedulerHandle;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Startup failures.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Store could not be prepared.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// HTTP transport could not be built.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

// ============================================================================
// SECTION: Startup
// ============================================================================

/// Services running after [`RallyContext::start`].
pub struct Startup {
    /// Migration result; `None` when no legacy store was supplied.
    pub migration: Option<MigrationOutcome>,
    /// Running scheduler drive loop.
    pub scheduler: SchedulerHandle,
}

// ============================================================================
// SECTION: Context
// ============================================================================

/// Process-wide service set.
pub struct RallyContext {
    /// Validated configuration.
    config: RallyConfig,
    /// Durable key/value store.
    kv: Arc<SqliteKvStore>,
    /// Durable reminder table.
    reminders: Arc<SqliteReminderStore>,
    /// Cache-first remote fetcher.
    fetcher: CachedJsonFetcher,
    /// Reminder scheduler.
    scheduler: Arc<ReminderScheduler>,
}

impl RallyContext {
    /// Builds the service set for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when the store path is invalid or the HTTP
    /// transport cannot be built.
    pub fn open(
        config: &RallyConfig,
        presenter: Arc<dyn ReminderPresenter>,
    ) -> Result<Self, ContextError> {
        config.validate()?;
        let database = SqliteDatabase::new(config.store.clone())?;
        let kv = Arc::new(SqliteKvStore::new(database.clone()));
        let reminders = Arc::new(SqliteReminderStore::new(database));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let cache_store: Arc<dyn KeyValueStore> = kv.clone();
        let cache = ResponseCache::new(cache_store, Arc::clone(&clock), config.cache.ttl());
        let transport = ReqwestTransport::new(&config.fetch.user_agent)?;
        let fetcher = CachedJsonFetcher::new(FetchClient::new(Arc::new(transport)), cache);

        let reminder_store: Arc<dyn ReminderStore> = reminders.clone();
        let scheduler = Arc::new(ReminderScheduler::new(reminder_store, presenter, clock));

        info!(store = %config.store.path.display(), dev_mode = config.dev_mode, "rally context ready");
        Ok(Self {
            config: config.clone(),
            kv,
            reminders,
            fetcher,
            scheduler,
        })
    }

    /// Returns the configuration the context was built from.
    #[must_use]
    pub const fn config(&self) -> &RallyConfig {
        &self.config
    }

    /// Returns the retry policy for outbound requests.
    #[must_use]
    pub const fn retry(&self) -> &RetryConfig {
        &self.config.fetch.retry
    }

    /// Returns true when user-facing errors should include raw detail.
    #[must_use]
    pub const fn dev_mode(&self) -> bool {
        self.config.dev_mode
    }

    /// Returns the durable key/value store.
    #[must_use]
    pub fn kv(&self) -> Arc<SqliteKvStore> {
        Arc::clone(&self.kv)
    }

    /// Returns the durable reminder table.
    #[must_use]
    pub fn reminders(&self) -> Arc<SqliteReminderStore> {
        Arc::clone(&self.reminders)
    }

    /// Returns the cache-first fetcher.
    #[must_use]
    pub const fn fetcher(&self) -> &CachedJsonFetcher {
        &self.fetcher
    }

    /// Returns the reminder scheduler.
    #[must_use]
    pub fn scheduler(&self) -> Arc<ReminderScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Returns a migration manager copying `legacy` into the durable store.
    #[must_use]
    pub fn migration(&self, legacy: Arc<dyn KeyValueStore>) -> MigrationManager {
        let target: Arc<dyn KeyValueStore> = self.kv.clone();
        MigrationManager::new(legacy, target)
    }

    /// Copies `legacy` into the durable store unless already done.
    pub fn migrate_from(&self, legacy: Arc<dyn KeyValueStore>) -> MigrationOutcome {
        self.migration(legacy).migrate()
    }

    /// Spawns the scheduler drive loop at the configured interval.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start_scheduler(&self) -> SchedulerHandle {
        self.scheduler().run(self.config.scheduler.poll_interval())
    }

    /// Migrates `legacy` when supplied, then spawns the scheduler.
    ///
    /// A failed migration is reported in [`Startup::migration`] and does not
    /// prevent the scheduler from starting; the next start retries it.
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(&self, legacy: Option<Arc<dyn KeyValueStore>>) -> Startup {
        let migration = legacy.map(|legacy| self.migrate_from(legacy));
        Startup {
            migration,
            scheduler: self.start_scheduler(),
        }
    }
}
