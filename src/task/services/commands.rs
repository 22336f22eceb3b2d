//! Command-layer orchestration for the single-active-task workflow.
//!
//! The repository does not enforce "at most one active task"; this service
//! checks for an active task before creating or resuming one and applies
//! the caller's [`ActiveConflictPolicy`]. Monitor notifications are sent
//! only after the store has committed and never affect the outcome.

use crate::error::ErrorKind;
use crate::ipc::IpcEvent;
use crate::task::{
    domain::{
        Reason, Task, TaskDescription, TaskDomainError, TaskEvent, TaskEventRecord,
        TaskEventType, TaskId, TaskState, TaskTransition,
    },
    ports::{EventRepository, TaskNotifier, TaskRepository, TaskRepositoryError},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// What to do with an already active task when another one is about to
/// become active.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActiveConflictPolicy {
    /// Refuse with [`TaskCommandError::ActiveTaskExists`].
    #[default]
    Reject,
    /// Complete the active task first.
    Complete,
    /// Cancel the active task with the given reason.
    Cancel(String),
    /// Defer the active task with the given reason.
    Defer(String),
    /// When adding, leave the active task alone so two tasks end up
    /// active. When resuming, defer the active task with
    /// [`RESUME_REPLACEMENT_REASON`].
    Force,
}

/// Deferral reason recorded when a forced resume displaces the active task.
pub const RESUME_REPLACEMENT_REASON: &str = "Replaced by resumed task";

/// Identifies a task either by its position in the deferred list or by ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSelector {
    /// 1-based position in [`TaskCommandService::deferred`].
    Ordinal(usize),
    /// Task identifier.
    Id(TaskId),
}

impl TaskSelector {
    /// Parses a positive ordinal or a UUID.
    ///
    /// # Errors
    ///
    /// Returns [`TaskCommandError::InvalidTaskNumber`] for zero or negative
    /// numbers and [`TaskCommandError::Domain`] for anything that is neither
    /// a number nor a UUID.
    pub fn parse(value: &str) -> Result<Self, TaskCommandError> {
        let trimmed = value.trim();
        if let Ok(number) = trimmed.parse::<i64>() {
            return usize::try_from(number)
                .ok()
                .filter(|ordinal| *ordinal > 0)
                .map(Self::Ordinal)
                .ok_or(TaskCommandError::InvalidTaskNumber(number));
        }
        Ok(Self::Id(TaskId::parse(trimmed)?))
    }
}

/// One row of the numbered deferred list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredEntry {
    /// 1-based position, oldest deferral first.
    pub ordinal: usize,
    /// The deferred task.
    pub task: Task,
}

/// Errors returned by [`TaskCommandService`].
#[derive(Debug, Error)]
pub enum TaskCommandError {
    /// Input or transition rejected by the domain rules.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),

    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] TaskRepositoryError),

    /// The command needs an active task and there is none.
    #[error("no active task")]
    NoActiveTask,

    /// Another task is already active and the policy is to reject.
    #[error("you already have an active task: {description}")]
    ActiveTaskExists {
        /// The active task.
        task_id: TaskId,
        /// Its description.
        description: String,
    },

    /// A task number below one was given.
    #[error("invalid task number: {0}")]
    InvalidTaskNumber(i64),

    /// A task number beyond the end of the deferred list was given.
    #[error("task number {number} not found (only {available} deferred tasks)")]
    TaskNumberOutOfRange {
        /// Requested ordinal.
        number: usize,
        /// Number of deferred tasks.
        available: usize,
    },

    /// Only deferred tasks can be resumed.
    #[error("task {task_id} is not deferred (current state: {state})")]
    NotDeferred {
        /// Selected task.
        task_id: TaskId,
        /// Its current state.
        state: TaskState,
    },
}

impl TaskCommandError {
    /// Returns the error classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain(err) => err.kind(),
            Self::Repository(err) => err.kind(),
            Self::NoActiveTask
            | Self::ActiveTaskExists { .. }
            | Self::InvalidTaskNumber(_)
            | Self::TaskNumberOutOfRange { .. }
            | Self::NotDeferred { .. } => ErrorKind::User,
        }
    }

    /// Returns the follow-up the user can take, if one applies.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NoActiveTask => Some("use `jot add` to start a task"),
            Self::ActiveTaskExists { .. } => Some(
                "use `jot done`, `jot cancel` or `jot defer` first, or pass --force",
            ),
            Self::InvalidTaskNumber(_) | Self::TaskNumberOutOfRange { .. } => {
                Some("use `jot deferred` to list deferred tasks")
            }
            Self::NotDeferred { .. } => Some(
                "only deferred tasks can be resumed; use `jot deferred` to list them",
            ),
            Self::Repository(TaskRepositoryError::NotFound(_)) => {
                Some("use `jot deferred` or `jot status` to find task identifiers")
            }
            Self::Domain(TaskDomainError::InvalidStateTransition { .. }) => {
                Some("use `jot status` to see the active task")
            }
            Self::Domain(_) | Self::Repository(_) => None,
        }
    }
}

/// Result type for task command operations.
pub type TaskCommandResult<T> = Result<T, TaskCommandError>;

/// Orchestrates task commands over a repository, a notifier and a clock.
#[derive(Clone)]
pub struct TaskCommandService<R, N, C>
where
    R: TaskRepository + EventRepository,
    N: TaskNotifier,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    notifier: Arc<N>,
    clock: Arc<C>,
}

impl<R, N, C> TaskCommandService<R, N, C>
where
    R: TaskRepository + EventRepository,
    N: TaskNotifier,
    C: Clock + Send + Sync,
{
    /// Creates a new command service.
    #[must_use]
    pub const fn new(repository: Arc<R>, notifier: Arc<N>, clock: Arc<C>) -> Self {
        Self {
            repository,
            notifier,
            clock,
        }
    }

    /// Creates a new active task.
    ///
    /// The description is validated before the store is touched.
    ///
    /// # Errors
    ///
    /// Returns a domain error for an invalid description or conflict
    /// reason, [`TaskCommandError::ActiveTaskExists`] when `policy` rejects
    /// the conflict, or a repository error when persistence fails.
    pub async fn add(
        &self,
        description: &str,
        policy: &ActiveConflictPolicy,
    ) -> TaskCommandResult<Task> {
        let validated = TaskDescription::new(description)?;
        self.resolve_conflict(policy, None).await?;

        let task = Task::new(validated, &*self.clock);
        self.repository.create_task(&task).await?;
        info!(task_id = %task.id(), "task created");
        self.notifier.notify(IpcEvent::TaskCreated, task.id()).await;
        Ok(task)
    }

    /// Completes the active task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskCommandError::NoActiveTask`] when nothing is active, or
    /// a repository error when persistence fails.
    pub async fn done(&self) -> TaskCommandResult<Task> {
        let active = self.require_active().await?;
        let (task, _) = self.apply(active, |task, clock| task.complete(clock)).await?;
        Ok(task)
    }

    /// Cancels the active task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyReason`] for a blank reason (without
    /// touching the store), [`TaskCommandError::NoActiveTask`] when nothing
    /// is active, or a repository error when persistence fails.
    pub async fn cancel(&self, reason: &str) -> TaskCommandResult<Task> {
        let cause = Reason::new(reason, TaskTransition::Cancel)?;
        let active = self.require_active().await?;
        let (task, _) = self
            .apply(active, move |task, clock| task.cancel(&cause, clock))
            .await?;
        Ok(task)
    }

    /// Defers the active task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyReason`] for a blank reason (without
    /// touching the store), [`TaskCommandError::NoActiveTask`] when nothing
    /// is active, or a repository error when persistence fails.
    pub async fn defer(&self, reason: &str) -> TaskCommandResult<Task> {
        let cause = Reason::new(reason, TaskTransition::Defer)?;
        let active = self.require_active().await?;
        let (task, _) = self
            .apply(active, move |task, clock| task.defer(&cause, clock))
            .await?;
        Ok(task)
    }

    /// Lists deferred tasks, oldest deferral first, numbered from one.
    ///
    /// # Errors
    ///
    /// Returns a repository error when the lookup fails.
    pub async fn deferred(&self) -> TaskCommandResult<Vec<DeferredEntry>> {
        let tasks = self.repository.get_deferred_tasks().await?;
        Ok(tasks
            .into_iter()
            .enumerate()
            .map(|(index, task)| DeferredEntry {
                ordinal: index + 1,
                task,
            })
            .collect())
    }

    /// Makes a deferred task active again.
    ///
    /// An ordinal is resolved against the deferred list as it is at call
    /// time, which may differ from a list shown earlier. A forced resume
    /// defers the current active task instead of leaving it active.
    ///
    /// # Errors
    ///
    /// Returns a selection error when the task cannot be found,
    /// [`TaskCommandError::NotDeferred`] when it is not deferred,
    /// [`TaskCommandError::ActiveTaskExists`] when `policy` rejects the
    /// conflict, or a repository error when persistence fails.
    pub async fn resume(
        &self,
        selector: TaskSelector,
        policy: &ActiveConflictPolicy,
    ) -> TaskCommandResult<Task> {
        let task_id = self.resolve(selector).await?;
        let deferred = self.repository.get_task_by_id(task_id).await?;
        if deferred.state() != TaskState::Deferred {
            return Err(TaskCommandError::NotDeferred {
                task_id,
                state: deferred.state(),
            });
        }

        let replace = ActiveConflictPolicy::Defer(RESUME_REPLACEMENT_REASON.to_owned());
        let effective = match policy {
            ActiveConflictPolicy::Force => &replace,
            other => other,
        };
        self.resolve_conflict(effective, Some(task_id)).await?;
        let (task, _) = self.apply(deferred, |task, clock| task.resume(clock)).await?;
        Ok(task)
    }

    /// Returns the active task, if any.
    ///
    /// # Errors
    ///
    /// Returns a repository error when the lookup fails.
    pub async fn status(&self) -> TaskCommandResult<Option<Task>> {
        Ok(self.repository.get_active_task().await?)
    }

    /// Returns the audit trail of the selected task, or of the active task
    /// when no selector is given.
    ///
    /// # Errors
    ///
    /// Returns [`TaskCommandError::NoActiveTask`] when no selector is given
    /// and nothing is active, a selection error when the task cannot be
    /// found, or a repository error when the lookup fails.
    pub async fn history(
        &self,
        selector: Option<TaskSelector>,
    ) -> TaskCommandResult<Vec<TaskEventRecord>> {
        let task_id = match selector {
            Some(chosen) => {
                let resolved = self.resolve(chosen).await?;
                // Surfaces NotFound for unknown identifiers.
                self.repository.get_task_by_id(resolved).await?.id()
            }
            None => self.require_active().await?.id(),
        };
        Ok(self.repository.get_events_for_task(task_id).await?)
    }

    async fn require_active(&self) -> TaskCommandResult<Task> {
        self.repository
            .get_active_task()
            .await?
            .ok_or(TaskCommandError::NoActiveTask)
    }

    async fn resolve(&self, selector: TaskSelector) -> TaskCommandResult<TaskId> {
        match selector {
            TaskSelector::Id(task_id) => Ok(task_id),
            TaskSelector::Ordinal(number) => {
                let deferred = self.repository.get_deferred_tasks().await?;
                let available = deferred.len();
                deferred
                    .into_iter()
                    .nth(number.saturating_sub(1))
                    .filter(|_| number > 0)
                    .map(|task| task.id())
                    .ok_or(TaskCommandError::TaskNumberOutOfRange { number, available })
            }
        }
    }

    /// Clears the way for another task to become active.
    ///
    /// `incoming` is the task about to become active; it never conflicts
    /// with itself.
    async fn resolve_conflict(
        &self,
        policy: &ActiveConflictPolicy,
        incoming: Option<TaskId>,
    ) -> TaskCommandResult<()> {
        // Validated before the lookup so a blank reason never reaches the store.
        let resolution = Resolution::try_from(policy)?;

        let Some(active) = self.repository.get_active_task().await? else {
            return Ok(());
        };
        if Some(active.id()) == incoming {
            return Ok(());
        }

        match resolution {
            Resolution::Reject => Err(TaskCommandError::ActiveTaskExists {
                task_id: active.id(),
                description: active.description().as_str().to_owned(),
            }),
            Resolution::Force => {
                warn!(task_id = %active.id(), "forcing a second active task");
                Ok(())
            }
            Resolution::Complete => {
                self.apply(active, |task, clock| task.complete(clock)).await?;
                Ok(())
            }
            Resolution::Cancel(reason) => {
                self.apply(active, move |task, clock| task.cancel(&reason, clock))
                    .await?;
                Ok(())
            }
            Resolution::Defer(reason) => {
                self.apply(active, move |task, clock| task.defer(&reason, clock))
                    .await?;
                Ok(())
            }
        }
    }

    /// Runs a transition, persists the task with its event, then notifies.
    async fn apply<F>(
        &self,
        mut task: Task,
        transition: F,
    ) -> TaskCommandResult<(Task, TaskEventRecord)>
    where
        F: FnOnce(&mut Task, &C) -> Result<TaskEvent, TaskDomainError> + Send,
    {
        let event = transition(&mut task, &*self.clock)?;
        let record = self.repository.update_task_with_event(&task, &event).await?;
        debug!(
            task_id = %task.id(),
            event = %record.event().event_type(),
            "task transitioned"
        );
        self.notifier
            .notify(notification_for(record.event().event_type()), task.id())
            .await;
        Ok((task, record))
    }
}

/// [`ActiveConflictPolicy`] with its reason validated.
enum Resolution {
    Reject,
    Force,
    Complete,
    Cancel(Reason),
    Defer(Reason),
}

impl TryFrom<&ActiveConflictPolicy> for Resolution {
    type Error = TaskDomainError;

    fn try_from(policy: &ActiveConflictPolicy) -> Result<Self, Self::Error> {
        Ok(match policy {
            ActiveConflictPolicy::Reject => Self::Reject,
            ActiveConflictPolicy::Force => Self::Force,
            ActiveConflictPolicy::Complete => Self::Complete,
            ActiveConflictPolicy::Cancel(reason) => {
                Self::Cancel(Reason::new(reason, TaskTransition::Cancel)?)
            }
            ActiveConflictPolicy::Defer(reason) => {
                Self::Defer(Reason::new(reason, TaskTransition::Defer)?)
            }
        })
    }
}

const fn notification_for(event_type: TaskEventType) -> IpcEvent {
    match event_type {
        TaskEventType::Created => IpcEvent::TaskCreated,
        TaskEventType::Completed => IpcEvent::TaskCompleted,
        TaskEventType::Cancelled => IpcEvent::TaskCancelled,
        TaskEventType::Deferred => IpcEvent::TaskDeferred,
        TaskEventType::Resumed => IpcEvent::TaskResumed,
    }
}
