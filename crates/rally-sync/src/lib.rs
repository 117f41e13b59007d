// crates/rally-sync/src/lib.rs
// ============================================================================
// Module: Rally Sync
// Description: Local-first services layered over the Rally stores.
// Purpose: Migrate legacy state, cache remote responses, and fire reminders.
// Dependencies: rally-config, rally-core, rally-fetch, rally-store-sqlite,
//               serde, serde_json, thiserror, tokio, tracing
// ============================================================================

//! ## Overview
//! - [`MigrationManager`] copies a legacy key/value store into the durable
//!   one exactly once.
//! - [`ResponseCache`] and [`CachedJsonFetcher`] keep remote JSON responses
//!   fresh for a time-to-live, keyed by canonical request fingerprints.
//! - [`ReminderScheduler`] fires due reminder rules and drives itself from
//!   an interval plus app lifecycle changes.
//! - [`RallyContext`] owns all of the above for one process.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cache;
pub mod context;
pub mod fetcher;
pub mod migration;
pub mod scheduler;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use cache::CacheNamespace;
pub use cache::DEFAULT_CACHE_TTL;
pub use cache::ResponseCache;
pub use context::ContextError;
pub use context::RallyContext;
pub use context::Startup;
pub use fetcher::CachedJsonFetcher;
pub use migration::MIGRATION_FLAG_KEY;
pub use migration::MigrationManager;
pub use migration::MigrationOutcome;
pub use migration::StorageStats;
pub use scheduler::AppLifecycle;
pub use scheduler::PollReport;
pub use scheduler::PresentError;
pub use scheduler::ReminderPresenter;
pub use scheduler::ReminderScheduler;
pub use scheduler::SchedulerError;
pub use scheduler::SchedulerHandle;
