//! Task aggregate root and the lifecycle state machine.

use super::{
    ParseTaskStateError, Reason, TaskDescription, TaskDomainError, TaskEvent, TaskEventType,
    TaskId,
};
use chrono::{DateTime, SubsecRound, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Task is currently being worked on.
    Active,
    /// Task has been finished.
    Completed,
    /// Task has been abandoned.
    Cancelled,
    /// Task has been set aside for later.
    Deferred,
}

impl TaskState {
    /// Every state, in declaration order.
    pub const ALL: [Self; 4] = [Self::Active, Self::Completed, Self::Cancelled, Self::Deferred];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Deferred => "deferred",
        }
    }

    /// Returns whether the state machine permits moving to `target`.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Active, Self::Completed | Self::Cancelled | Self::Deferred)
                | (Self::Deferred, Self::Active)
        )
    }
}

impl TryFrom<&str> for TaskState {
    type Error = ParseTaskStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "deferred" => Ok(Self::Deferred),
            _ => Err(ParseTaskStateError(value.to_owned())),
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named transitions between task states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskTransition {
    /// `Active` to `Completed`.
    Complete,
    /// `Active` to `Cancelled`.
    Cancel,
    /// `Active` to `Deferred`.
    Defer,
    /// `Deferred` to `Active`.
    Resume,
}

impl TaskTransition {
    /// State the task must be in for the transition to apply.
    #[must_use]
    pub const fn from_state(self) -> TaskState {
        match self {
            Self::Complete | Self::Cancel | Self::Defer => TaskState::Active,
            Self::Resume => TaskState::Deferred,
        }
    }

    /// State the task ends up in.
    #[must_use]
    pub const fn to_state(self) -> TaskState {
        match self {
            Self::Complete => TaskState::Completed,
            Self::Cancel => TaskState::Cancelled,
            Self::Defer => TaskState::Deferred,
            Self::Resume => TaskState::Active,
        }
    }

    /// Audit event emitted by the transition.
    #[must_use]
    pub const fn event_type(self) -> TaskEventType {
        match self {
            Self::Complete => TaskEventType::Completed,
            Self::Cancel => TaskEventType::Cancelled,
            Self::Defer => TaskEventType::Deferred,
            Self::Resume => TaskEventType::Resumed,
        }
    }

    /// Returns the verb used in messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Cancel => "cancel",
            Self::Defer => "defer",
            Self::Resume => "resume",
        }
    }
}

impl fmt::Display for TaskTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    description: TaskDescription,
    state: TaskState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
    deferred_at: Option<DateTime<Utc>>,
    defer_reason: Option<String>,
    deferred_until: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted task aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Persisted description.
    pub description: TaskDescription,
    /// Persisted lifecycle state.
    pub state: TaskState,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted latest lifecycle timestamp.
    pub updated_at: DateTime<Utc>,
    /// When the task was completed, if it was.
    pub completed_at: Option<DateTime<Utc>>,
    /// When the task was cancelled, if it is.
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Why the task was cancelled.
    pub cancel_reason: Option<String>,
    /// When the task was deferred, if it is.
    pub deferred_at: Option<DateTime<Utc>>,
    /// Why the task was deferred.
    pub defer_reason: Option<String>,
    /// When a deferred task should be revisited.
    pub deferred_until: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a new active task.
    ///
    /// The matching [`TaskEventType::Created`] event is available through
    /// [`Task::creation_event`].
    #[must_use]
    pub fn new(description: TaskDescription, clock: &impl Clock) -> Self {
        let timestamp = now(clock);
        Self {
            id: TaskId::new(),
            description,
            state: TaskState::Active,
            created_at: timestamp,
            updated_at: timestamp,
            completed_at: None,
            cancelled_at: None,
            cancel_reason: None,
            deferred_at: None,
            defer_reason: None,
            deferred_until: None,
        }
    }

    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskData) -> Self {
        Self {
            id: data.id,
            description: data.description,
            state: data.state,
            created_at: data.created_at,
            updated_at: data.updated_at,
            completed_at: data.completed_at,
            cancelled_at: data.cancelled_at,
            cancel_reason: data.cancel_reason,
            deferred_at: data.deferred_at,
            defer_reason: data.defer_reason,
            deferred_until: data.deferred_until,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the task description.
    #[must_use]
    pub const fn description(&self) -> &TaskDescription {
        &self.description
    }

    /// Returns the task lifecycle state.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.state
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest lifecycle timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the completion timestamp, if any.
    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns the cancellation timestamp, if any.
    #[must_use]
    pub const fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    /// Returns the deferral timestamp, if any.
    #[must_use]
    pub const fn deferred_at(&self) -> Option<DateTime<Utc>> {
        self.deferred_at
    }

    /// Returns the deferral reason, if any.
    #[must_use]
    pub fn defer_reason(&self) -> Option<&str> {
        self.defer_reason.as_deref()
    }

    /// Returns the revisit timestamp, if any.
    #[must_use]
    pub const fn deferred_until(&self) -> Option<DateTime<Utc>> {
        self.deferred_until
    }

    /// Returns the event recorded when this task was created.
    #[must_use]
    pub const fn creation_event(&self) -> TaskEvent {
        TaskEvent::new(self.id, TaskEventType::Created, self.created_at)
    }

    /// Marks the active task as completed.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] if the task is not
    /// active. The task is left untouched in that case.
    pub fn complete(&mut self, clock: &impl Clock) -> Result<TaskEvent, TaskDomainError> {
        let timestamp = self.begin(TaskTransition::Complete, clock)?;
        self.completed_at = Some(timestamp);
        self.clear_cancellation();
        self.clear_deferral();
        self.deferred_until = None;
        Ok(TaskEvent::new(self.id, TaskEventType::Completed, timestamp))
    }

    /// Cancels the active task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] if the task is not
    /// active. The task is left untouched in that case.
    pub fn cancel(
        &mut self,
        reason: &Reason,
        clock: &impl Clock,
    ) -> Result<TaskEvent, TaskDomainError> {
        let timestamp = self.begin(TaskTransition::Cancel, clock)?;
        let event =
            TaskEvent::new(self.id, TaskEventType::Cancelled, timestamp).with_reason(reason);
        self.cancelled_at = Some(timestamp);
        self.cancel_reason = Some(reason.as_str().to_owned());
        self.completed_at = None;
        self.clear_deferral();
        self.deferred_until = None;
        Ok(event)
    }

    /// Defers the active task.
    ///
    /// A previously recorded `deferred_until` is kept.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] if the task is not
    /// active. The task is left untouched in that case.
    pub fn defer(
        &mut self,
        reason: &Reason,
        clock: &impl Clock,
    ) -> Result<TaskEvent, TaskDomainError> {
        let timestamp = self.begin(TaskTransition::Defer, clock)?;
        let event =
            TaskEvent::new(self.id, TaskEventType::Deferred, timestamp).with_reason(reason);
        self.deferred_at = Some(timestamp);
        self.defer_reason = Some(reason.as_str().to_owned());
        self.completed_at = None;
        self.clear_cancellation();
        Ok(event)
    }

    /// Makes a deferred task active again.
    ///
    /// `completed_at` survives when the task had been completed before it
    /// was deferred.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] if the task is not
    /// deferred. The task is left untouched in that case.
    pub fn resume(&mut self, clock: &impl Clock) -> Result<TaskEvent, TaskDomainError> {
        let timestamp = self.begin(TaskTransition::Resume, clock)?;
        self.clear_deferral();
        self.clear_cancellation();
        self.deferred_until = None;
        Ok(TaskEvent::new(self.id, TaskEventType::Resumed, timestamp))
    }

    /// Validates the transition, then moves the task to its target state.
    fn begin(
        &mut self,
        transition: TaskTransition,
        clock: &impl Clock,
    ) -> Result<DateTime<Utc>, TaskDomainError> {
        if self.state != transition.from_state() {
            return Err(TaskDomainError::InvalidStateTransition {
                task_id: self.id,
                from: self.state,
                transition,
            });
        }
        let timestamp = now(clock);
        self.state = transition.to_state();
        self.updated_at = timestamp.max(self.created_at);
        Ok(timestamp)
    }

    fn clear_cancellation(&mut self) {
        self.cancelled_at = None;
        self.cancel_reason = None;
    }

    fn clear_deferral(&mut self) {
        self.deferred_at = None;
        self.defer_reason = None;
    }
}

/// Current time truncated to the microsecond precision kept in storage.
fn now(clock: &impl Clock) -> DateTime<Utc> {
    clock.utc().trunc_subsecs(6)
}
