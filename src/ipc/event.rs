//! Event names exchanged between commands and the monitor.

use super::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Notification sent to the monitor process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IpcEvent {
    /// A task was created.
    TaskCreated,
    /// The active task was completed.
    TaskCompleted,
    /// The active task was cancelled.
    TaskCancelled,
    /// The active task was deferred.
    TaskDeferred,
    /// A deferred task was resumed.
    TaskResumed,
    /// Configuration changed on disk.
    ConfigChanged,
}

impl IpcEvent {
    /// Every event, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::TaskCreated,
        Self::TaskCompleted,
        Self::TaskCancelled,
        Self::TaskDeferred,
        Self::TaskResumed,
        Self::ConfigChanged,
    ];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TaskCreated => "TASK_CREATED",
            Self::TaskCompleted => "TASK_COMPLETED",
            Self::TaskCancelled => "TASK_CANCELLED",
            Self::TaskDeferred => "TASK_DEFERRED",
            Self::TaskResumed => "TASK_RESUMED",
            Self::ConfigChanged => "CONFIG_CHANGED",
        }
    }
}

impl TryFrom<&str> for IpcEvent {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == value)
            .ok_or_else(|| ProtocolError::UnknownEvent(value.to_owned()))
    }
}

impl fmt::Display for IpcEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
