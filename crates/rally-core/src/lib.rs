// crates/rally-core/src/lib.rs
// ============================================================================
// Module: Rally Core
// Description: Shared domain model for the Rally persistence and sync layer.
// Purpose: Define storage contracts, time values, reminder rules, and
//          request fingerprints used by every other Rally crate.
// Dependencies: serde, serde_json, serde_jcs, sha2, thiserror, time
// ============================================================================

//! ## Overview
//! Rally core holds the backend-agnostic pieces of the training-log
//! persistence layer. Storage engines, HTTP transports, and schedulers live in
//! sibling crates and depend on the contracts defined here:
//! - [`KeyValueStore`]: durable string key/value map with an atomic batch write.
//! - [`ReminderStore`]: persisted reminder rules with soft-delete semantics.
//! - [`Clock`]: injectable wall-clock source so freshness and due checks are
//!   testable without sleeping.
//! - [`fingerprint`]: canonical request fingerprints for response caching.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod fingerprint;
pub mod kv;
pub mod reminder;
pub mod time;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use error::StorageError;
pub use fingerprint::Fingerprint;
pub use fingerprint::FingerprintError;
pub use kv::InMemoryKvStore;
pub use kv::KeyValueStore;
pub use reminder::Recurrence;
pub use reminder::ReminderEvent;
pub use reminder::ReminderId;
pub use reminder::ReminderKind;
pub use reminder::ReminderRule;
pub use reminder::ReminderState;
pub use reminder::ReminderStore;
pub use time::Clock;
pub use time::ManualClock;
pub use time::SystemClock;
pub use time::Timestamp;
