//! Error types for task domain validation and state transitions.

use super::{TaskId, TaskState, TaskTransition};
use crate::error::ErrorKind;
use thiserror::Error;

/// Errors returned while constructing domain values or transitioning tasks.
///
/// Every variant is a user error: the caller asked for something the
/// domain rules do not allow.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The task description is empty after trimming.
    #[error("description cannot be empty")]
    EmptyDescription,

    /// The task description exceeds the maximum length.
    #[error("description is {length} characters long, maximum is {max}")]
    DescriptionTooLong {
        /// Character count after trimming.
        length: usize,
        /// Maximum permitted character count.
        max: usize,
    },

    /// A cancel or defer reason is empty after trimming.
    #[error("{0} reason cannot be empty")]
    EmptyReason(TaskTransition),

    /// The task is not in the state the transition starts from.
    #[error("cannot {transition} task {task_id}: task is {from}")]
    InvalidStateTransition {
        /// Task that rejected the transition.
        task_id: TaskId,
        /// Current state of the task.
        from: TaskState,
        /// Requested transition.
        transition: TaskTransition,
    },

    /// A task identifier could not be parsed.
    #[error("invalid task identifier: {0}")]
    InvalidTaskId(String),
}

impl TaskDomainError {
    /// Returns the error classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::User
    }
}

/// Error returned while parsing task states from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task state: {0}")]
pub struct ParseTaskStateError(pub String);

/// Error returned while parsing event types from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task event type: {0}")]
pub struct ParseEventTypeError(pub String);
