// crates/rally-config/src/config.rs
// ============================================================================
// Module: Rally Configuration Model
// Description: TOML-backed settings with defaults and validation.
// Purpose: Provide one validated source of runtime settings.
// Dependencies: rally-fetch, rally-store-sqlite, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! Resolution order for the config file: an explicit path, then the
//! `RALLY_CONFIG` environment variable, then `rally.toml` in the working
//! directory. Only an explicitly requested file must exist; a missing default
//! file yields [`RallyConfig::default`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use rally_fetch::RetryConfig;
use rally_fetch::transport::DEFAULT_USER_AGENT;
use rally_store_sqlite::SqliteStoreConfig;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "RALLY_CONFIG";
/// Config file used when no path is given.
pub const DEFAULT_CONFIG_NAME: &str = "rally.toml";
/// Maximum config file size in bytes.
const MAX_CONFIG_FILE_BYTES: u64 = 1_048_576;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum path component length.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Default cache time-to-live (ms).
const DEFAULT_CACHE_TTL_MS: u64 = 3_600_000;
/// Default scheduler poll interval (ms).
const DEFAULT_POLL_INTERVAL_MS: u64 = 60_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
///
/// # Invariants
/// - Messages are user-facing and name the offending setting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// Config file is not valid TOML for the model.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Config values violate a constraint.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// Outbound request settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Retry and timeout policy.
    pub retry: RetryConfig,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry time-to-live in milliseconds.
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_CACHE_TTL_MS,
        }
    }
}

impl CacheConfig {
    /// Returns the time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Reminder scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between polls while the app is active, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl SchedulerConfig {
    /// Returns the poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Root configuration.
///
/// # Invariants
/// - A value returned by [`RallyConfig::load`] or
///   [`RallyConfig::from_toml_str`] has passed [`RallyConfig::validate`].
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct RallyConfig {
    /// `SQLite` store settings.
    pub store: SqliteStoreConfig,
    /// Outbound request settings.
    pub fetch: FetchConfig,
    /// Response cache settings.
    pub cache: CacheConfig,
    /// Reminder scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Development mode: user-facing errors include raw detail.
    pub dev_mode: bool,
}

impl RallyConfig {
    /// Loads and validates configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is unreadable, oversized, not
    /// UTF-8, not valid TOML, or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (resolved, explicit) = resolve_path(path);
        validate_path(&resolved)?;
        if !explicit && !resolved.exists() {
            return Ok(Self::default());
        }
        let metadata =
            std::fs::metadata(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if metadata.len() > MAX_CONFIG_FILE_BYTES {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let bytes = std::fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        let content = String::from_utf8(bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.path.as_os_str().is_empty() {
            return Err(invalid("store path must not be empty"));
        }
        let retry = &self.fetch.retry;
        if retry.max_attempts == 0 {
            return Err(invalid("fetch max_attempts must be greater than zero"));
        }
        if !(retry.backoff_multiplier.is_finite() && retry.backoff_multiplier > 0.0) {
            return Err(invalid("fetch backoff_multiplier must be finite and greater than zero"));
        }
        if retry.delay_ms > retry.max_delay_ms {
            return Err(invalid("fetch delay_ms must not exceed max_delay_ms"));
        }
        if retry.timeout_ms == 0 {
            return Err(invalid("fetch timeout_ms must be greater than zero"));
        }
        if self.fetch.user_agent.trim().is_empty() {
            return Err(invalid("fetch user_agent must not be empty"));
        }
        if self.cache.ttl_ms == 0 {
            return Err(invalid("cache ttl_ms must be greater than zero"));
        }
        if self.scheduler.poll_interval_ms == 0 {
            return Err(invalid("scheduler poll_interval_ms must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds an invalid-config error.
fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}

/// Resolves the config path; the flag reports whether it was requested
/// explicitly.
fn resolve_path(path: Option<&Path>) -> (PathBuf, bool) {
    if let Some(path) = path {
        return (path.to_path_buf(), true);
    }
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(value) if !value.is_empty() => (PathBuf::from(value), true),
        _ => (PathBuf::from(DEFAULT_CONFIG_NAME), false),
    }
}

/// Enforces path length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(invalid("config path exceeds max length"));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(invalid("config path component too long"));
        }
    }
    Ok(())
}
