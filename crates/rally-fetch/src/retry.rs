// crates/rally-fetch/src/retry.rs
// ============================================================================
// Module: Retry Policy
// Description: Retry configuration, backoff schedule, and retry observer hook.
// Purpose: Keep retry timing deterministic and observable.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Backoff is capped exponential with no jitter: the delay after attempt `n`
//! (1-indexed) is `min(delay_ms * backoff_multiplier^(n-1), max_delay_ms)`.
//! The multiplier may be fractional. Overflowing or non-finite intermediate
//! values settle at the cap.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::error::FetchError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of attempts.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default delay before the first retry (ms).
const DEFAULT_DELAY_MS: u64 = 1_000;
/// Default backoff multiplier.
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
/// Default delay cap (ms).
const DEFAULT_MAX_DELAY_MS: u64 = 10_000;
/// Default per-attempt timeout (ms).
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Retry and timeout settings for one logical request.
///
/// # Invariants
/// - All durations are milliseconds.
/// - `max_attempts` counts the first attempt; zero is rejected by config
///   validation and treated as one by the client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub delay_ms: u64,
    /// Growth factor applied per retry; fractional values such as `1.5` are allowed.
    pub backoff_multiplier: f64,
    /// Upper bound for any single delay.
    pub max_delay_ms: u64,
    /// Per-attempt timeout.
    pub timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay_ms: DEFAULT_DELAY_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl RetryConfig {
    /// Returns the per-attempt timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Returns the delay to wait after failed attempt `attempt` (1-indexed).
#[must_use]
pub fn backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let cap = Duration::from_millis(config.max_delay_ms);
    if config.delay_ms == 0 {
        return Duration::ZERO;
    }
    let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
    let factor = config.backoff_multiplier.powi(exponent);
    let base = Duration::from_millis(config.delay_ms);
    Duration::try_from_secs_f64(base.as_secs_f64() * factor).map_or(cap, |delay| delay.min(cap))
}

// ============================================================================
// SECTION: Observer
// ============================================================================

/// Hook notified before each retry.
pub trait RetryObserver: Send + Sync {
    /// Called after failed attempt `attempt` when another attempt follows `delay`.
    fn on_retry(&self, attempt: u32, error: &FetchError, delay: Duration);
}

/// Observer that ignores retries.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRetryObserver;

impl RetryObserver for NoopRetryObserver {
    fn on_retry(&self, _attempt: u32, _error: &FetchError, _delay: Duration) {}
}
