//! Notification port used to tell a running monitor about task changes.

use crate::ipc::IpcEvent;
use crate::task::domain::TaskId;
use async_trait::async_trait;

/// Best-effort notification sink.
///
/// Implementations must never fail the caller: delivery problems are
/// swallowed (and at most logged).
#[async_trait]
pub trait TaskNotifier: Send + Sync {
    /// Announces that `event` happened to `task_id`.
    async fn notify(&self, event: IpcEvent, task_id: TaskId);
}
