// crates/rally-store-sqlite/src/reminders.rs
// ============================================================================
// Module: SQLite Reminder Store
// Description: Durable ReminderStore backed by the `notifications` table.
// Purpose: Persist reminder rules, answer due queries, and record firings.
// Dependencies: rally-core, rusqlite, tracing
// ============================================================================

//! ## Overview
//! Rules are upserted by id and never deleted; cancellation flips `enabled`.
//! The due query is evaluated in SQL so only matching rows are decoded. Rows
//! that fail to decode are logged and skipped rather than failing the query.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rally_core::Recurrence;
use rally_core::ReminderId;
use rally_core::ReminderKind;
use rally_core::ReminderRule;
use rally_core::ReminderState;
use rally_core::ReminderStore;
use rally_core::StorageError;
use rally_core::Timestamp;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use tracing::warn;

use crate::database::SqliteDatabase;

// ============================================================================
// SECTION: Statements
// ============================================================================

/// Column list shared by every rule query.
const RULE_COLUMNS: &str =
    "id, type, title, message, scheduled_time, recurring, recurring_pattern, enabled, last_shown";

// ============================================================================
// SECTION: Store
// ============================================================================

/// Reminder rule store persisted in `SQLite`.
///
/// # Invariants
/// - Rows are never physically deleted.
/// - `created_at` is set on first insert and preserved across upserts.
#[derive(Clone)]
pub struct SqliteReminderStore {
    /// Shared database handle.
    db: SqliteDatabase,
}

impl SqliteReminderStore {
    /// Creates a reminder store over `db`.
    #[must_use]
    pub const fn new(db: SqliteDatabase) -> Self {
        Self {
            db,
        }
    }

    /// Lists every rule, enabled or not, earliest scheduled time first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the query fails.
    pub fn list_all(&self) -> Result<Vec<ReminderRule>, StorageError> {
        self.db.with_connection(|connection| {
            query_rules(
                connection,
                &format!("SELECT {RULE_COLUMNS} FROM notifications ORDER BY scheduled_time, rowid"),
                &[],
            )
        })
    }
}

impl ReminderStore for SqliteReminderStore {
    fn upsert(&self, rule: &ReminderRule) -> Result<(), StorageError> {
        let created_at = Timestamp::now().as_unix_millis();
        self.db.with_connection(|connection| {
            connection
                .execute(
                    "INSERT INTO notifications (
                        id, type, title, message, scheduled_time, recurring,
                        recurring_pattern, enabled, last_shown, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    ON CONFLICT(id) DO UPDATE SET
                        type = excluded.type,
                        title = excluded.title,
                        message = excluded.message,
                        scheduled_time = excluded.scheduled_time,
                        recurring = excluded.recurring,
                        recurring_pattern = excluded.recurring_pattern,
                        enabled = excluded.enabled,
                        last_shown = excluded.last_shown",
                    params![
                        rule.id.as_str(),
                        rule.kind.as_str(),
                        rule.title,
                        rule.message,
                        rule.scheduled_at.as_unix_millis(),
                        rule.recurrence.is_recurring(),
                        rule.recurrence.pattern(),
                        rule.state.is_enabled(),
                        rule.last_shown.map(Timestamp::as_unix_millis),
                        created_at,
                    ],
                )
                .map_err(|err| StorageError::Db(err.to_string()))?;
            Ok(())
        })
    }

    fn get(&self, id: &ReminderId) -> Result<Option<ReminderRule>, StorageError> {
        self.db.with_connection(|connection| {
            let row = connection
                .query_row(
                    &format!("SELECT {RULE_COLUMNS} FROM notifications WHERE id = ?1"),
                    params![id.as_str()],
                    read_row,
                )
                .optional()
                .map_err(|err| StorageError::Db(err.to_string()))?;
            row.map(RuleRow::into_rule).transpose()
        })
    }

    fn set_state(&self, id: &ReminderId, state: ReminderState) -> Result<bool, StorageError> {
        self.db.with_connection(|connection| {
            let changed = connection
                .execute(
                    "UPDATE notifications SET enabled = ?1 WHERE id = ?2",
                    params![state.is_enabled(), id.as_str()],
                )
                .map_err(|err| StorageError::Db(err.to_string()))?;
            Ok(changed > 0)
        })
    }

    fn disable_all(&self) -> Result<usize, StorageError> {
        self.db.with_connection(|connection| {
            connection
                .execute("UPDATE notifications SET enabled = 0", params![])
                .map_err(|err| StorageError::Db(err.to_string()))
        })
    }

    fn due(&self, now: Timestamp) -> Result<Vec<ReminderRule>, StorageError> {
        self.db.with_connection(|connection| {
            query_rules(
                connection,
                &format!(
                    "SELECT {RULE_COLUMNS} FROM notifications
                     WHERE enabled = 1
                       AND scheduled_time <= ?1
                       AND (last_shown IS NULL OR last_shown < scheduled_time)
                     ORDER BY scheduled_time, rowid"
                ),
                &[&now.as_unix_millis()],
            )
        })
    }

    fn record_fired(
        &self,
        id: &ReminderId,
        shown_at: Timestamp,
        next: Option<Timestamp>,
    ) -> Result<(), StorageError> {
        self.db.with_connection(|connection| {
            let changed = connection
                .execute(
                    "UPDATE notifications
                     SET last_shown = ?1, scheduled_time = COALESCE(?2, scheduled_time)
                     WHERE id = ?3",
                    params![
                        shown_at.as_unix_millis(),
                        next.map(Timestamp::as_unix_millis),
                        id.as_str()
                    ],
                )
                .map_err(|err| StorageError::Db(err.to_string()))?;
            if changed == 0 {
                return Err(StorageError::Invalid(format!("unknown reminder: {id}")));
            }
            Ok(())
        })
    }

    fn list_scheduled(&self) -> Result<Vec<ReminderRule>, StorageError> {
        self.db.with_connection(|connection| {
            query_rules(
                connection,
                &format!(
                    "SELECT {RULE_COLUMNS} FROM notifications WHERE enabled = 1
                     ORDER BY scheduled_time, rowid"
                ),
                &[],
            )
        })
    }
}

// ============================================================================
// SECTION: Row Decoding
// ============================================================================

/// Raw column values of one `notifications` row.
struct RuleRow {
    /// Rule id.
    id: String,
    /// Persisted kind label.
    kind: String,
    /// Title.
    title: String,
    /// Message.
    message: String,
    /// Scheduled time in unix millis.
    scheduled_time: i64,
    /// Recurring flag.
    recurring: bool,
    /// Recurrence pattern label.
    pattern: Option<String>,
    /// Enabled flag.
    enabled: bool,
    /// Last shown time in unix millis.
    last_shown: Option<i64>,
}

impl RuleRow {
    /// Converts raw columns into a domain rule.
    fn into_rule(self) -> Result<ReminderRule, StorageError> {
        if self.id.is_empty() {
            return Err(StorageError::Invalid("reminder row has empty id".to_string()));
        }
        Ok(ReminderRule {
            id: ReminderId::new(self.id),
            kind: ReminderKind::from_label(&self.kind),
            title: self.title,
            message: self.message,
            scheduled_at: Timestamp::from_unix_millis(self.scheduled_time),
            recurrence: Recurrence::from_columns(self.recurring, self.pattern.as_deref()),
            state: ReminderState::from_enabled(self.enabled),
            last_shown: self.last_shown.map(Timestamp::from_unix_millis),
        })
    }
}

/// Reads raw columns from a row selected with [`RULE_COLUMNS`].
fn read_row(row: &Row<'_>) -> rusqlite::Result<RuleRow> {
    Ok(RuleRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        title: row.get(2)?,
        message: row.get(3)?,
        scheduled_time: row.get(4)?,
        recurring: row.get(5)?,
        pattern: row.get(6)?,
        enabled: row.get(7)?,
        last_shown: row.get(8)?,
    })
}

/// Runs a rule query, skipping rows that fail to decode.
fn query_rules(
    connection: &Connection,
    sql: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<ReminderRule>, StorageError> {
    let mut stmt = connection.prepare(sql).map_err(|err| StorageError::Db(err.to_string()))?;
    let rows = stmt.query_map(args, read_row).map_err(|err| StorageError::Db(err.to_string()))?;
    let mut rules = Vec::new();
    for row in rows {
        match row.map_err(|err| StorageError::Db(err.to_string())).and_then(RuleRow::into_rule) {
            Ok(rule) => rules.push(rule),
            Err(err) => warn!(error = %err, "skipping unreadable reminder row"),
        }
    }
    Ok(rules)
}
