// crates/rally-core/src/time.rs
// ============================================================================
// Module: Rally Time Model
// Description: Unix-millisecond timestamps and injectable clocks.
// Purpose: Keep due checks and cache freshness deterministic under test.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Components never read the wall clock directly; they ask a [`Clock`]. The
//! production clock is [`SystemClock`]; tests and replay tools drive a
//! [`ManualClock`] forward explicitly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Milliseconds in one minute.
pub const MINUTE_MS: i64 = 60 * 1_000;
/// Milliseconds in one hour.
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
/// Milliseconds in one day.
pub const DAY_MS: i64 = 24 * HOUR_MS;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Wall-clock instant expressed as unix epoch milliseconds (UTC).
///
/// # Invariants
/// - Ordering matches chronological ordering.
/// - Arithmetic saturates instead of overflowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Self(i64::try_from(now.as_millis()).unwrap_or(i64::MAX))
    }

    /// Returns this timestamp shifted by `millis` (negative values move back).
    #[must_use]
    pub const fn add_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Returns this timestamp shifted forward by whole days.
    #[must_use]
    pub const fn add_days(self, days: i64) -> Self {
        self.add_millis(days.saturating_mul(DAY_MS))
    }

    /// Returns the elapsed milliseconds from `earlier` to `self`.
    #[must_use]
    pub const fn millis_since(self, earlier: Self) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Converts to a UTC calendar date-time, if representable.
    #[must_use]
    pub fn to_utc_datetime(self) -> Option<OffsetDateTime> {
        let nanos = i128::from(self.0).checked_mul(1_000_000)?;
        OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
    }

    /// Converts from a UTC calendar date-time.
    #[must_use]
    pub fn from_utc_datetime(value: OffsetDateTime) -> Self {
        let millis = value.unix_timestamp_nanos() / 1_000_000;
        Self(i64::try_from(millis).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// Clock backed by the operating system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually advanced clock.
///
/// # Invariants
/// - Time only changes through [`ManualClock::set`] and [`ManualClock::advance`].
/// - Clones share the same underlying instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    /// Current instant in unix milliseconds.
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.as_unix_millis())),
        }
    }

    /// Moves the clock to `at`.
    pub fn set(&self, at: Timestamp) {
        self.millis.store(at.as_unix_millis(), Ordering::SeqCst);
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.millis.load(Ordering::SeqCst))
    }
}
