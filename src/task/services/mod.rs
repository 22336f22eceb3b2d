//! Application services for task command orchestration.

mod commands;

pub use commands::{
    ActiveConflictPolicy, DeferredEntry, RESUME_REPLACEMENT_REASON, TaskCommandError,
    TaskCommandResult, TaskCommandService, TaskSelector,
};
