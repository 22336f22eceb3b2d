//! Repository ports for task persistence and the audit trail.

use crate::error::ErrorKind;
use crate::task::domain::{Task, TaskEvent, TaskEventRecord, TaskId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task repository operations.
pub type TaskRepositoryResult<T> = Result<T, TaskRepositoryError>;

/// Task persistence contract.
///
/// Implementations must make every mutating operation atomic: a task row
/// is never observable without the event that accompanied its change.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Stores a new task together with its `CREATED` event.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::DuplicateTask`] when the task ID already
    /// exists, or a persistence error when the store fails. Neither the task
    /// nor the event is written on failure.
    async fn create_task(&self, task: &Task) -> TaskRepositoryResult<()>;

    /// Fetches a task by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not exist.
    async fn get_task_by_id(&self, id: TaskId) -> TaskRepositoryResult<Task>;

    /// Returns the active task, or `None` when no task is active.
    ///
    /// Should more than one task be active, the oldest one is returned.
    async fn get_active_task(&self) -> TaskRepositoryResult<Option<Task>>;

    /// Returns all deferred tasks, oldest deferral first.
    async fn get_deferred_tasks(&self) -> TaskRepositoryResult<Vec<Task>>;

    /// Overwrites an existing task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not exist.
    async fn update_task(&self, task: &Task) -> TaskRepositoryResult<()>;

    /// Overwrites an existing task and appends `event` in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not exist.
    /// On any failure neither the task nor the event is changed.
    async fn update_task_with_event(
        &self,
        task: &Task,
        event: &TaskEvent,
    ) -> TaskRepositoryResult<TaskEventRecord>;
}

/// Audit trail persistence contract.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Appends an event.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when the referenced task does not exist
    /// or the store fails.
    async fn create_event(&self, event: &TaskEvent) -> TaskRepositoryResult<TaskEventRecord>;

    /// Returns the events recorded for a task ordered by timestamp, ties
    /// broken by insertion order. Unknown tasks yield an empty list.
    async fn get_events_for_task(&self, id: TaskId) -> TaskRepositoryResult<Vec<TaskEventRecord>>;
}

/// Errors returned by task repository implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskRepositoryError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The store could not be opened or configured.
    #[error("cannot open database: {0}")]
    Connection(Arc<dyn std::error::Error + Send + Sync>),

    /// Schema migration failed and was rolled back.
    #[error("migration to schema version {version} failed: {source}")]
    Migration {
        /// Version the migration was moving to.
        version: i32,
        /// Underlying failure.
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Wraps a connection or configuration error.
    pub fn connection(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Connection(Arc::new(err))
    }

    /// Wraps a failure raised while migrating to `version`.
    pub fn migration(version: i32, err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Migration {
            version,
            source: Arc::new(err),
        }
    }

    /// Returns the error classification.
    ///
    /// A missing task is the caller's mistake; everything else is a fault
    /// of the store.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::User,
            Self::DuplicateTask(_)
            | Self::Connection(_)
            | Self::Migration { .. }
            | Self::Persistence(_) => ErrorKind::Storage,
        }
    }
}

impl From<diesel::result::Error> for TaskRepositoryError {
    fn from(err: diesel::result::Error) -> Self {
        Self::persistence(err)
    }
}
