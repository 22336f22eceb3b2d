//! Append-only audit events recorded alongside task mutations.

use super::{EventId, ParseEventTypeError, Reason, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of state change recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskEventType {
    /// Task was created in the active state.
    Created,
    /// Task was completed.
    Completed,
    /// Task was cancelled with a reason.
    Cancelled,
    /// Task was deferred with a reason.
    Deferred,
    /// Deferred task was made active again.
    Resumed,
}

impl TaskEventType {
    /// Every event type, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Created,
        Self::Completed,
        Self::Cancelled,
        Self::Deferred,
        Self::Resumed,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Deferred => "DEFERRED",
            Self::Resumed => "RESUMED",
        }
    }
}

impl TryFrom<&str> for TaskEventType {
    type Error = ParseEventTypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|event_type| event_type.as_str() == value.trim())
            .ok_or_else(|| ParseEventTypeError(value.to_owned()))
    }
}

impl fmt::Display for TaskEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit event produced by a task transition, not yet persisted.
///
/// The timestamp always equals the task timestamp set by the same
/// transition (`created_at`, `completed_at`, `cancelled_at`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvent {
    task_id: TaskId,
    event_type: TaskEventType,
    timestamp: DateTime<Utc>,
    metadata: Option<String>,
}

impl TaskEvent {
    /// Creates an event without metadata.
    #[must_use]
    pub const fn new(task_id: TaskId, event_type: TaskEventType, timestamp: DateTime<Utc>) -> Self {
        Self {
            task_id,
            event_type,
            timestamp,
            metadata: None,
        }
    }

    /// Attaches `{"reason": ...}` metadata.
    #[must_use]
    pub fn with_reason(mut self, reason: &Reason) -> Self {
        self.metadata = Some(serde_json::json!({ "reason": reason.as_str() }).to_string());
        self
    }

    /// Attaches raw metadata as loaded from storage.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Option<String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns the task this event belongs to.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Returns the event type.
    #[must_use]
    pub const fn event_type(&self) -> TaskEventType {
        self.event_type
    }

    /// Returns when the event occurred.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the raw JSON metadata, if any.
    #[must_use]
    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }

    /// Extracts the `reason` entry from the metadata object.
    ///
    /// Returns `None` when there is no metadata, it is not a JSON object,
    /// or it carries no string `reason`.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        let metadata = self.metadata.as_deref()?;
        let value: serde_json::Value = serde_json::from_str(metadata).ok()?;
        value.get("reason")?.as_str().map(str::to_owned)
    }
}

/// Audit event as stored, carrying its store-assigned identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEventRecord {
    id: EventId,
    event: TaskEvent,
}

impl TaskEventRecord {
    /// Pairs a persisted event with its identifier.
    #[must_use]
    pub const fn new(id: EventId, event: TaskEvent) -> Self {
        Self { id, event }
    }

    /// Returns the store-assigned identifier.
    #[must_use]
    pub const fn id(&self) -> EventId {
        self.id
    }

    /// Returns the recorded event.
    #[must_use]
    pub const fn event(&self) -> &TaskEvent {
        &self.event
    }
}
