//! Domain model for the single-active-task tracker.
//!
//! Tasks move through a small state machine (`Active`, `Completed`,
//! `Cancelled`, `Deferred`) and every transition yields the audit event
//! that must be persisted together with the mutated task.

mod error;
mod event;
mod ids;
mod task;
mod text;

pub use error::{ParseEventTypeError, ParseTaskStateError, TaskDomainError};
pub use event::{TaskEvent, TaskEventRecord, TaskEventType};
pub use ids::{EventId, TaskId};
pub use task::{PersistedTaskData, Task, TaskState, TaskTransition};
pub use text::{Reason, TaskDescription};
