// crates/rally-sync/src/scheduler.rs
// ============================================================================
// Module: Reminder Scheduler
// Description: Fires due reminder rules and drives polling from lifecycle.
// Purpose: Deliver local reminders at most once per scheduled occurrence.
// Dependencies: rally-core, thiserror, tokio, tracing
// ============================================================================

//! ## Overview
//! A poll loads the due rules, earliest first, hands each one to the
//! [`ReminderPresenter`], and then records the firing: `last_shown` is
//! stamped and recurring rules move to their next occurrence in one update.
//! A rule whose presentation fails is left untouched so the next poll retries
//! it; a failure on one rule never stops the rest of the cycle.
//!
//! The drive loop polls once on start whatever the lifecycle state, then on
//! every interval tick while the app is [`AppLifecycle::Active`], and
//! immediately whenever the app returns to the foreground. After the start-up
//! poll, nothing runs while the app is backgrounded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use rally_core::Clock;
use rally_core::ReminderEvent;
use rally_core::ReminderId;
use rally_core::ReminderRule;
use rally_core::ReminderState;
use rally_core::ReminderStore;
use rally_core::StorageError;
use rally_core::reminder::MISSED_WORKOUT_ID;
use rally_core::reminder::WEEKLY_REPORT_ID;
use rally_core::reminder::WORKOUT_REMINDER_ID;
use rally_core::reminder::missed_workout_reminder;
use rally_core::reminder::parse_time_of_day;
use rally_core::reminder::weekly_report;
use rally_core::reminder::workout_reminder;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default interval between polls while active.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
/// Smallest interval the drive loop accepts.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Presentation failure reported by a [`ReminderPresenter`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("reminder presentation failed: {0}")]
pub struct PresentError(pub String);

/// Scheduler operation failures.
///
/// # Invariants
/// - Variants are stable for CLI error mapping.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Reminder store failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Time of day was not `HH:MM`.
    #[error("invalid time of day: {0}")]
    InvalidTime(String),
    /// The current time could not be mapped to a calendar date.
    #[error("current time is outside the supported calendar range")]
    OutOfRange,
}

// ============================================================================
// SECTION: Collaborators
// ============================================================================

/// Shows a fired reminder to the user.
pub trait ReminderPresenter: Send + Sync {
    /// Presents one reminder.
    ///
    /// # Errors
    ///
    /// Returns [`PresentError`] when the reminder could not be shown.
    fn present(&self, event: &ReminderEvent) -> Result<(), PresentError>;
}

/// Host application lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AppLifecycle {
    /// In the foreground and interactive.
    #[default]
    Active,
    /// Visible but not interactive.
    Inactive,
    /// Not visible.
    Background,
}

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PollReport {
    /// Rules presented and recorded, in firing order.
    pub fired: Vec<ReminderId>,
    /// Rules that were due but failed to present or record.
    pub failed: Vec<ReminderId>,
}

// ============================================================================
// SECTION: Scheduler
// ============================================================================

/// Reminder rule scheduler.
///
/// # Invariants
/// - This is the only writer of `last_shown` and of advanced schedule times.
/// - Polls are skipped by [`ReminderScheduler::tick`] unless the app is active.
pub struct ReminderScheduler {
    /// Rule store.
    store: Arc<dyn ReminderStore>,
    /// Presentation collaborator.
    presenter: Arc<dyn ReminderPresenter>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Last reported lifecycle state.
    lifecycle: Mutex<AppLifecycle>,
}

impl ReminderScheduler {
    /// Creates a scheduler; the app is assumed active.
    #[must_use]
    pub fn new(
        store: Arc<dyn ReminderStore>,
        presenter: Arc<dyn ReminderPresenter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            presenter,
            clock,
            lifecycle: Mutex::new(AppLifecycle::Active),
        }
    }

    // ------------------------------------------------------------------------
    // Rule management
    // ------------------------------------------------------------------------

    /// Inserts or replaces a rule by id.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store fails.
    pub fn schedule(&self, rule: &ReminderRule) -> Result<(), StorageError> {
        self.store.upsert(rule)?;
        debug!(id = %rule.id, at = %rule.scheduled_at, "reminder scheduled");
        Ok(())
    }

    /// Disables a rule; returns false when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store fails.
    pub fn cancel(&self, id: &ReminderId) -> Result<bool, StorageError> {
        self.store.set_state(id, ReminderState::Disabled)
    }

    /// Disables every rule; returns the number of rules touched.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store fails.
    pub fn cancel_all(&self) -> Result<usize, StorageError> {
        let count = self.store.disable_all()?;
        info!(count, "all reminders cancelled");
        Ok(count)
    }

    /// Lists enabled rules, earliest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store fails.
    pub fn scheduled_reminders(&self) -> Result<Vec<ReminderRule>, StorageError> {
        self.store.list_scheduled()
    }

    /// Schedules the daily training reminder at `time_of_day` (`HH:MM`, UTC).
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] for a malformed time or a store failure.
    pub fn schedule_workout_reminder(
        &self,
        time_of_day: &str,
        enabled: bool,
    ) -> Result<ReminderRule, SchedulerError> {
        let at = parse_time_of_day(time_of_day)
            .ok_or_else(|| SchedulerError::InvalidTime(time_of_day.to_string()))?;
        let rule = workout_reminder(self.clock.now(), at, enabled).ok_or(SchedulerError::OutOfRange)?;
        self.schedule(&rule)?;
        Ok(rule)
    }

    /// Schedules the evening missed-workout nudge.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] when the store fails.
    pub fn schedule_missed_workout_reminder(
        &self,
        enabled: bool,
    ) -> Result<ReminderRule, SchedulerError> {
        let rule =
            missed_workout_reminder(self.clock.now(), enabled).ok_or(SchedulerError::OutOfRange)?;
        self.schedule(&rule)?;
        Ok(rule)
    }

    /// Schedules the weekly progress report.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] when the store fails.
    pub fn schedule_weekly_report(&self, enabled: bool) -> Result<ReminderRule, SchedulerError> {
        let rule = weekly_report(self.clock.now(), enabled).ok_or(SchedulerError::OutOfRange)?;
        self.schedule(&rule)?;
        Ok(rule)
    }

    /// Cancels the daily training reminder.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store fails.
    pub fn cancel_workout_reminder(&self) -> Result<bool, StorageError> {
        self.cancel(&ReminderId::new(WORKOUT_REMINDER_ID))
    }

    /// Cancels the missed-workout nudge.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store fails.
    pub fn cancel_missed_workout_reminder(&self) -> Result<bool, StorageError> {
        self.cancel(&ReminderId::new(MISSED_WORKOUT_ID))
    }

    /// Cancels the weekly progress report.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store fails.
    pub fn cancel_weekly_report(&self) -> Result<bool, StorageError> {
        self.cancel(&ReminderId::new(WEEKLY_REPORT_ID))
    }

    // ------------------------------------------------------------------------
    // Firing
    // ------------------------------------------------------------------------

    /// Fires every due rule.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] only when the due rules cannot be loaded;
    /// per-rule failures are reported in [`PollReport::failed`].
    pub fn poll(&self) -> Result<PollReport, StorageError> {
        let now = self.clock.now();
        let due = self.store.due(now)?;
        let mut report = PollReport::default();
        for rule in due {
            if let Err(err) = self.presenter.present(&rule.event()) {
                warn!(id = %rule.id, error = %err, "reminder not shown; will retry");
                report.failed.push(rule.id);
                continue;
            }
            let next = rule.recurrence.next_after(rule.scheduled_at, now);
            match self.store.record_fired(&rule.id, now, next) {
                Ok(()) => {
                    debug!(id = %rule.id, "reminder fired");
                    report.fired.push(rule.id);
                }
                Err(err) => {
                    warn!(id = %rule.id, error = %err, "reminder shown but not recorded");
                    report.failed.push(rule.id);
                }
            }
        }
        if !report.fired.is_empty() || !report.failed.is_empty() {
            info!(fired = report.fired.len(), failed = report.failed.len(), "reminder poll");
        }
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Returns the last reported lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> AppLifecycle {
        *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a lifecycle change, polling when the app returns to the
    /// foreground.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the triggered poll cannot load due rules.
    pub fn set_lifecycle(&self, state: AppLifecycle) -> Result<Option<PollReport>, StorageError> {
        let previous = {
            let mut current = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, state)
        };
        if state == AppLifecycle::Active && previous != AppLifecycle::Active {
            debug!("app foregrounded; polling reminders");
            return self.poll().map(Some);
        }
        Ok(None)
    }

    /// Marks the app active, polling if it was not.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the triggered poll cannot load due rules.
    pub fn on_foreground(&self) -> Result<Option<PollReport>, StorageError> {
        self.set_lifecycle(AppLifecycle::Active)
    }

    /// Interval hook: polls only while the app is active.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the poll cannot load due rules.
    pub fn tick(&self) -> Result<Option<PollReport>, StorageError> {
        if self.lifecycle() == AppLifecycle::Active {
            self.poll().map(Some)
        } else {
            Ok(None)
        }
    }

    // ------------------------------------------------------------------------
    // Drive loop
    // ------------------------------------------------------------------------

    /// Spawns the drive loop on the current tokio runtime.
    #[must_use]
    pub fn run(self: Arc<Self>, poll_interval: Duration) -> SchedulerHandle {
        let (lifecycle_tx, lifecycle_rx) = watch::channel(self.lifecycle());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(drive(self, poll_interval, lifecycle_rx, shutdown_rx));
        SchedulerHandle {
            lifecycle_tx,
            shutdown_tx,
            join,
        }
    }
}

// ============================================================================
// SECTION: Drive Loop
// ============================================================================

/// Control handle for a running drive loop.
///
/// Dropping the handle stops the loop at its next wake-up.
pub struct SchedulerHandle {
    /// Lifecycle updates consumed by the loop.
    lifecycle_tx: watch::Sender<AppLifecycle>,
    /// Shutdown signal.
    shutdown_tx: watch::Sender<bool>,
    /// Loop task.
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Reports a lifecycle change to the loop.
    pub fn set_lifecycle(&self, state: AppLifecycle) {
        self.lifecycle_tx.send_replace(state);
    }

    /// Stops the loop and waits for it to finish.
    pub async fn shutdown(self) {
        self.shutdown_tx.send_replace(true);
        if let Err(err) = self.join.await {
            warn!(error = %err, "reminder scheduler task ended abnormally");
        }
    }
}

/// Polls on each tick and on foreground transitions until shut down.
async fn drive(
    scheduler: Arc<ReminderScheduler>,
    poll_interval: Duration,
    mut lifecycle: watch::Receiver<AppLifecycle>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(poll_interval.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let interval_ms = u64::try_from(poll_interval.as_millis()).unwrap_or(u64::MAX);
    info!(interval_ms, "reminder scheduler started");
    ticker.tick().await;
    log_poll(scheduler.poll().map(Some));
    loop {
        tokio::select! {
            _ = ticker.tick() => log_poll(scheduler.tick()),
            changed = lifecycle.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *lifecycle.borrow_and_update();
                log_poll(scheduler.set_lifecycle(state));
                if state == AppLifecycle::Active {
                    ticker.reset();
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("reminder scheduler stopped");
}

/// Logs a failed poll; individual rule failures are logged by the poll.
fn log_poll(result: Result<Option<PollReport>, StorageError>) {
    if let Err(err) = result {
        warn!(error = %err, "reminder poll failed");
    }
}
