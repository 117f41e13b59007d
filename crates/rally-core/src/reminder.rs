// crates/rally-core/src/reminder.rs
// ============================================================================
// Module: Rally Reminder Rules
// Description: Local reminder rule model, lifecycle, and storage contract.
// Purpose: Describe when a reminder is due and how recurring rules advance.
// Dependencies: crate::error, crate::time, serde, time
// ============================================================================

//! ## Overview
//! A [`ReminderRule`] is a persisted local notification. Rules are upserted by
//! id, soft-deleted by moving to [`ReminderState::Disabled`], and mutated by
//! the scheduler when they fire: `last_shown` is stamped and recurring rules
//! move their `scheduled_at` forward by one interval.
//!
//! A rule is *due* when it is [`ReminderState::Scheduled`], its scheduled time
//! has passed, and it has not been shown since that scheduled time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use ::time::Time;
use ::time::Weekday;
use serde::Deserialize;
use serde::Serialize;

use crate::error::StorageError;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Rule id of the daily training reminder.
pub const WORKOUT_REMINDER_ID: &str = "workout_reminder";
/// Rule id of the evening missed-workout nudge.
pub const MISSED_WORKOUT_ID: &str = "missed_workout";
/// Rule id of the weekly progress report.
pub const WEEKLY_REPORT_ID: &str = "weekly_report";
/// Hour of day (UTC) for the missed-workout check.
pub const MISSED_WORKOUT_HOUR: u8 = 20;
/// Hour of day (UTC) for the weekly report.
pub const WEEKLY_REPORT_HOUR: u8 = 10;

// ============================================================================
// SECTION: Identifiers and Enums
// ============================================================================

/// Stable reminder identifier, also the upsert key.
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReminderId(String);

impl ReminderId {
    /// Creates a new reminder identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReminderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ReminderId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ReminderId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Reminder category.
///
/// # Invariants
/// - Labels returned by [`ReminderKind::as_str`] are the persisted values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    /// Scheduled training session reminder.
    WorkoutReminder,
    /// Nudge when no workout was logged today.
    MissedWorkout,
    /// Weekly training summary.
    WeeklyReport,
    /// Caller-defined reminder.
    Custom,
}

impl ReminderKind {
    /// Returns the persisted label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WorkoutReminder => "workout_reminder",
            Self::MissedWorkout => "missed_workout",
            Self::WeeklyReport => "weekly_report",
            Self::Custom => "custom",
        }
    }

    /// Parses a persisted label; unrecognized labels map to [`ReminderKind::Custom`].
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            "workout_reminder" => Self::WorkoutReminder,
            "missed_workout" => Self::MissedWorkout,
            "weekly_report" => Self::WeeklyReport,
            _ => Self::Custom,
        }
    }
}

/// How a rule repeats after firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    /// Fires once.
    Once,
    /// Advances by one day after firing.
    Daily,
    /// Advances by seven days after firing.
    Weekly,
}

impl Recurrence {
    /// Returns true for repeating rules.
    #[must_use]
    pub const fn is_recurring(self) -> bool {
        !matches!(self, Self::Once)
    }

    /// Returns the persisted `recurring_pattern` value.
    #[must_use]
    pub const fn pattern(self) -> Option<&'static str> {
        match self {
            Self::Once => None,
            Self::Daily => Some("daily"),
            Self::Weekly => Some("weekly"),
        }
    }

    /// Rebuilds a recurrence from the persisted `recurring` and
    /// `recurring_pattern` columns. A recurring rule with a missing or
    /// unknown pattern advances daily.
    #[must_use]
    pub fn from_columns(recurring: bool, pattern: Option<&str>) -> Self {
        if !recurring {
            return Self::Once;
        }
        match pattern {
            Some("weekly") => Self::Weekly,
            _ => Self::Daily,
        }
    }

    /// Returns the next scheduled time after an occurrence at `current`.
    #[must_use]
    pub const fn advance(self, current: Timestamp) -> Option<Timestamp> {
        match self {
            Self::Once => None,
            Self::Daily => Some(current.add_days(1)),
            Self::Weekly => Some(current.add_days(7)),
        }
    }

    /// Returns the first occurrence after `current` that is strictly later
    /// than `now`, stepping by [`Recurrence::advance`]. Occurrences missed
    /// while the app was not polling collapse into the single firing that
    /// called this.
    #[must_use]
    pub const fn next_after(self, current: Timestamp, now: Timestamp) -> Option<Timestamp> {
        let Some(first) = self.advance(current) else {
            return None;
        };
        let period = first.millis_since(current);
        let behind = now.millis_since(first);
        if behind < 0 || period <= 0 {
            return Some(first);
        }
        let steps = behind / period + 1;
        Some(first.add_millis(steps.saturating_mul(period)))
    }
}

/// Lifecycle state of a persisted rule.
///
/// # Invariants
/// - `Disabled` rules are never due and are never physically deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderState {
    /// Active; fires when due.
    Scheduled,
    /// Soft-deleted; kept for history and re-enable.
    Disabled,
}

impl ReminderState {
    /// Maps the persisted `enabled` flag.
    #[must_use]
    pub const fn from_enabled(enabled: bool) -> Self {
        if enabled { Self::Scheduled } else { Self::Disabled }
    }

    /// Returns the persisted `enabled` flag.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Scheduled)
    }
}

// ============================================================================
// SECTION: Rule
// ============================================================================

/// Persisted local reminder.
///
/// # Invariants
/// - `id` is unique within a reminder store.
/// - `last_shown`, when set, is the instant the rule last fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRule {
    /// Stable identifier and upsert key.
    pub id: ReminderId,
    /// Reminder category.
    pub kind: ReminderKind,
    /// Title shown to the user.
    pub title: String,
    /// Body shown to the user.
    pub message: String,
    /// Next occurrence.
    pub scheduled_at: Timestamp,
    /// Repeat behaviour.
    pub recurrence: Recurrence,
    /// Lifecycle state.
    pub state: ReminderState,
    /// Last time the rule fired.
    pub last_shown: Option<Timestamp>,
}

impl ReminderRule {
    /// Creates a scheduled rule that has never fired.
    #[must_use]
    pub fn new(
        id: impl Into<ReminderId>,
        kind: ReminderKind,
        title: impl Into<String>,
        message: impl Into<String>,
        scheduled_at: Timestamp,
        recurrence: Recurrence,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            scheduled_at,
            recurrence,
            state: ReminderState::Scheduled,
            last_shown: None,
        }
    }

    /// Returns the rule with the given lifecycle state.
    #[must_use]
    pub fn with_state(mut self, state: ReminderState) -> Self {
        self.state = state;
        self
    }

    /// Returns true when the rule should fire at `now`.
    #[must_use]
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.state.is_enabled()
            && self.scheduled_at <= now
            && self.last_shown.is_none_or(|shown| shown < self.scheduled_at)
    }

    /// Returns the presentation payload for this rule.
    #[must_use]
    pub fn event(&self) -> ReminderEvent {
        ReminderEvent {
            id: self.id.clone(),
            kind: self.kind,
            title: self.title.clone(),
            message: self.message.clone(),
        }
    }
}

/// Payload handed to the presentation layer when a rule fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderEvent {
    /// Rule that fired.
    pub id: ReminderId,
    /// Reminder category.
    pub kind: ReminderKind,
    /// Title shown to the user.
    pub title: String,
    /// Body shown to the user.
    pub message: String,
}

// ============================================================================
// SECTION: Store Contract
// ============================================================================

/// Persisted table of reminder rules.
///
/// # Invariants
/// - Rules are never physically deleted.
/// - [`ReminderStore::record_fired`] updates `last_shown` and `scheduled_at`
///   atomically.
pub trait ReminderStore: Send + Sync {
    /// Inserts or replaces a rule by id.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend fails.
    fn upsert(&self, rule: &ReminderRule) -> Result<(), StorageError>;

    /// Loads one rule.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend fails or the row is invalid.
    fn get(&self, id: &ReminderId) -> Result<Option<ReminderRule>, StorageError>;

    /// Changes the lifecycle state of one rule; returns false if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend fails.
    fn set_state(&self, id: &ReminderId, state: ReminderState) -> Result<bool, StorageError>;

    /// Disables every rule; returns the number of rows touched.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend fails.
    fn disable_all(&self) -> Result<usize, StorageError>;

    /// Lists rules due at `now`, earliest scheduled time first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend fails.
    fn due(&self, now: Timestamp) -> Result<Vec<ReminderRule>, StorageError>;

    /// Records that a rule fired at `shown_at`, moving it to `next` when set.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend fails; nothing is changed.
    fn record_fired(
        &self,
        id: &ReminderId,
        shown_at: Timestamp,
        next: Option<Timestamp>,
    ) -> Result<(), StorageError>;

    /// Lists enabled rules, earliest scheduled time first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend fails.
    fn list_scheduled(&self) -> Result<Vec<ReminderRule>, StorageError>;
}

// ============================================================================
// SECTION: Built-in Rules
// ============================================================================

/// Parses an `HH:MM` time of day.
#[must_use]
pub fn parse_time_of_day(value: &str) -> Option<Time> {
    let (hours, minutes) = value.trim().split_once(':')?;
    let hours: u8 = hours.parse().ok()?;
    let minutes: u8 = minutes.parse().ok()?;
    Time::from_hms(hours, minutes, 0).ok()
}

/// Returns `at` on the UTC calendar day containing `now`.
#[must_use]
pub fn same_day_at(now: Timestamp, at: Time) -> Option<Timestamp> {
    let date_time = now.to_utc_datetime()?.replace_time(at);
    Some(Timestamp::from_utc_datetime(date_time))
}

/// Returns the next occurrence of `at`: today if still ahead of `now`, else tomorrow.
#[must_use]
pub fn next_time_of_day(now: Timestamp, at: Time) -> Option<Timestamp> {
    let today = same_day_at(now, at)?;
    if today < now { Some(today.add_days(1)) } else { Some(today) }
}

/// Returns `at` on the next `weekday` strictly after today's date.
#[must_use]
pub fn next_weekday_at(now: Timestamp, weekday: Weekday, at: Time) -> Option<Timestamp> {
    let today = now.to_utc_datetime()?.weekday();
    let ahead = i64::from(weekday.number_days_from_sunday())
        - i64::from(today.number_days_from_sunday());
    let days = if ahead <= 0 { ahead + 7 } else { ahead };
    Some(same_day_at(now, at)?.add_days(days))
}

/// Daily training reminder at the next `at` time of day.
#[must_use]
pub fn workout_reminder(now: Timestamp, at: Time, enabled: bool) -> Option<ReminderRule> {
    let scheduled_at = next_time_of_day(now, at)?;
    Some(
        ReminderRule::new(
            WORKOUT_REMINDER_ID,
            ReminderKind::WorkoutReminder,
            "Time to Train!",
            "Your squash workout is scheduled. Let's improve your game!",
            scheduled_at,
            Recurrence::Daily,
        )
        .with_state(ReminderState::from_enabled(enabled)),
    )
}

/// Evening nudge at 20:00 UTC today, repeating daily.
#[must_use]
pub fn missed_workout_reminder(now: Timestamp, enabled: bool) -> Option<ReminderRule> {
    let at = Time::from_hms(MISSED_WORKOUT_HOUR, 0, 0).ok()?;
    Some(
        ReminderRule::new(
            MISSED_WORKOUT_ID,
            ReminderKind::MissedWorkout,
            "Don't Break Your Streak!",
            "You haven't logged your workout today. Keep your momentum going!",
            same_day_at(now, at)?,
            Recurrence::Daily,
        )
        .with_state(ReminderState::from_enabled(enabled)),
    )
}

/// Weekly summary on the coming Sunday at 10:00 UTC, repeating weekly.
#[must_use]
pub fn weekly_report(now: Timestamp, enabled: bool) -> Option<ReminderRule> {
    let at = Time::from_hms(WEEKLY_REPORT_HOUR, 0, 0).ok()?;
    Some(
        ReminderRule::new(
            WEEKLY_REPORT_ID,
            ReminderKind::WeeklyReport,
            "Weekly Progress Report",
            "Check out your training summary for this week!",
            next_weekday_at(now, Weekday::Sunday, at)?,
            Recurrence::Weekly,
        )
        .with_state(ReminderState::from_enabled(enabled)),
    )
}

// ============================================================================
// SECTION: Tests
// ============================================================================
