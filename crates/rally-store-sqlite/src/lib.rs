// crates/rally-store-sqlite/src/lib.rs
// ============================================================================
// Module: Rally SQLite Store
// Description: SQLite-backed implementations of the Rally storage contracts.
// Purpose: Persist key/value entries and reminder rules through one handle.
// Dependencies: rally-core, rusqlite, serde, tracing
// ============================================================================

//! ## Overview
//! A single [`SqliteDatabase`] handle owns the `SQLite` connection. It is opened
//! lazily on first use and shared by [`SqliteKvStore`] and
//! [`SqliteReminderStore`], so every statement issued by the process is
//! serialized through the same connection.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod database;
pub mod kv;
pub mod reminders;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use database::SqliteDatabase;
pub use database::SqliteJournalMode;
pub use database::SqliteStoreConfig;
pub use database::SqliteSyncMode;
pub use kv::SqliteKvStore;
pub use reminders::SqliteReminderStore;
