//! Fire-and-forget client used by commands to notify a running monitor.

use super::{IpcEvent, serialize_message};
use crate::task::{domain::TaskId, ports::TaskNotifier};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on connecting and writing one message.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(100);

/// Sends single-message connections to the monitor socket.
///
/// Delivery never fails from the caller's point of view: a missing
/// socket, a refused connection or a timeout only produce `debug` logs,
/// anything else a `warn` log.
#[derive(Debug, Clone)]
pub struct IpcClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl IpcClient {
    /// Creates a client for the socket at `socket_path`.
    #[must_use]
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Overrides the send timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the socket path.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Sends one message, swallowing every failure.
    #[cfg(unix)]
    pub async fn send(&self, event: IpcEvent, task_id: &str) {
        let line = match serialize_message(event, task_id, None) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "cannot encode monitor notification");
                return;
            }
        };

        match tokio::time::timeout(self.timeout, self.deliver(line.as_bytes())).await {
            Ok(Ok(())) => debug!(%event, task_id, "notified monitor"),
            Ok(Err(err)) => log_delivery_failure(&self.socket_path, &err),
            Err(_) => debug!(
                path = %self.socket_path.display(),
                timeout_ms = self.timeout.as_millis(),
                "monitor notification timed out"
            ),
        }
    }

    /// Unix sockets are unavailable; notifications are dropped.
    #[cfg(not(unix))]
    #[expect(clippy::unused_async, reason = "signature matches the unix build")]
    pub async fn send(&self, _event: IpcEvent, _task_id: &str) {}

    #[cfg(unix)]
    async fn deliver(&self, bytes: &[u8]) -> std::io::Result<()> {
        use tokio::io::AsyncWriteExt;

        let mut stream = tokio::net::UnixStream::connect(&self.socket_path).await?;
        stream.write_all(bytes).await?;
        stream.shutdown().await
    }
}

#[cfg(unix)]
fn log_delivery_failure(path: &Path, err: &std::io::Error) {
    use std::io::ErrorKind;

    match err.kind() {
        ErrorKind::NotFound | ErrorKind::ConnectionRefused => {
            debug!(path = %path.display(), error = %err, "monitor not running");
        }
        _ => warn!(path = %path.display(), error = %err, "monitor notification failed"),
    }
}

#[async_trait]
impl TaskNotifier for IpcClient {
    async fn notify(&self, event: IpcEvent, task_id: TaskId) {
        self.send(event, &task_id.to_string()).await;
    }
}
