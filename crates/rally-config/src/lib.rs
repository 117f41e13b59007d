// crates/rally-config/src/lib.rs
// ============================================================================
// Module: Rally Config
// Description: Configuration model, loading, and validation for Rally.
// Purpose: Turn a TOML file into a validated runtime configuration.
// Dependencies: rally-fetch, rally-store-sqlite, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! [`RallyConfig`] groups the store, fetch, cache, and scheduler settings.
//! Every section has defaults, so an empty file (or no file at all) yields a
//! working configuration. Loading is strict about the input itself: path
//! length, file size, and encoding are checked before parsing, and the parsed
//! value is validated before it is returned.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use config::CacheConfig;
pub use config::ConfigError;
pub use config::FetchConfig;
pub use config::RallyConfig;
pub use config::SchedulerConfig;
