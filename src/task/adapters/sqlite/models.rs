//! Row models and conversions between rows and domain values.

use super::schema::{task_events, tasks};
use crate::task::domain::{
    EventId, PersistedTaskData, Task, TaskDescription, TaskEvent, TaskEventRecord, TaskEventType,
    TaskId, TaskState,
};
use crate::task::ports::{TaskRepositoryError, TaskRepositoryResult};
use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;

/// Row for the `tasks` table, used for reads, inserts and full updates.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct TaskRow {
    /// Hyphenated task identifier.
    pub id: String,
    /// Trimmed description.
    pub description: String,
    /// Lowercase lifecycle state.
    pub state: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
    /// Completion timestamp.
    pub completed_at: Option<String>,
    /// Revisit timestamp.
    pub deferred_until: Option<String>,
    /// Cancellation timestamp.
    pub cancelled_at: Option<String>,
    /// Cancellation reason.
    pub cancel_reason: Option<String>,
    /// Deferral timestamp.
    pub deferred_at: Option<String>,
    /// Deferral reason.
    pub defer_reason: Option<String>,
}

/// Query result row for `task_events`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = task_events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EventRow {
    /// Event identifier.
    pub id: i64,
    /// Owning task.
    pub task_id: String,
    /// Uppercase event type.
    pub event_type: String,
    /// Event timestamp.
    pub timestamp: String,
    /// Optional JSON metadata.
    pub metadata: Option<String>,
}

/// Insert model for `task_events`; the identifier is assigned by the store.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = task_events)]
pub struct NewEventRow {
    /// Owning task.
    pub task_id: String,
    /// Uppercase event type.
    pub event_type: String,
    /// Event timestamp.
    pub timestamp: String,
    /// Optional JSON metadata.
    pub metadata: Option<String>,
}

impl From<&Task> for TaskRow {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id().to_string(),
            description: task.description().as_str().to_owned(),
            state: task.state().as_str().to_owned(),
            created_at: format_timestamp(task.created_at()),
            updated_at: format_timestamp(task.updated_at()),
            completed_at: task.completed_at().map(format_timestamp),
            deferred_until: task.deferred_until().map(format_timestamp),
            cancelled_at: task.cancelled_at().map(format_timestamp),
            cancel_reason: task.cancel_reason().map(str::to_owned),
            deferred_at: task.deferred_at().map(format_timestamp),
            defer_reason: task.defer_reason().map(str::to_owned),
        }
    }
}

impl TryFrom<TaskRow> for Task {
    type Error = TaskRepositoryError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let state =
            TaskState::try_from(row.state.as_str()).map_err(TaskRepositoryError::persistence)?;
        let data = PersistedTaskData {
            id: TaskId::parse(&row.id).map_err(TaskRepositoryError::persistence)?,
            description: TaskDescription::new(&row.description)
                .map_err(TaskRepositoryError::persistence)?,
            state,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            completed_at: parse_optional_timestamp(row.completed_at.as_deref())?,
            cancelled_at: parse_optional_timestamp(row.cancelled_at.as_deref())?,
            cancel_reason: row.cancel_reason,
            deferred_at: parse_optional_timestamp(row.deferred_at.as_deref())?,
            defer_reason: row.defer_reason,
            deferred_until: parse_optional_timestamp(row.deferred_until.as_deref())?,
        };
        Ok(Self::from_persisted(data))
    }
}

impl From<&TaskEvent> for NewEventRow {
    fn from(event: &TaskEvent) -> Self {
        Self {
            task_id: event.task_id().to_string(),
            event_type: event.event_type().as_str().to_owned(),
            timestamp: format_timestamp(event.timestamp()),
            metadata: event.metadata().map(str::to_owned),
        }
    }
}

impl TryFrom<EventRow> for TaskEventRecord {
    type Error = TaskRepositoryError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let event_type = TaskEventType::try_from(row.event_type.as_str())
            .map_err(TaskRepositoryError::persistence)?;
        let task_id = TaskId::parse(&row.task_id).map_err(TaskRepositoryError::persistence)?;
        let event = TaskEvent::new(task_id, event_type, parse_timestamp(&row.timestamp)?)
            .with_metadata(row.metadata);
        Ok(Self::new(EventId::new(row.id), event))
    }
}

/// Formats a timestamp so that lexicographic order matches time order.
#[must_use]
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> TaskRepositoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(TaskRepositoryError::persistence)
}

fn parse_optional_timestamp(value: Option<&str>) -> TaskRepositoryResult<Option<DateTime<Utc>>> {
    value.map(parse_timestamp).transpose()
}
