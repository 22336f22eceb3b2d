//! Monitor-side socket server.
//!
//! One accept loop plus one task per connection, all tracked by a
//! [`TaskTracker`] and stopped through a shared [`CancellationToken`].
//! Each connection is read in chunks and split on `\n`; complete lines
//! are decoded and handed to the registered callback.

use super::{IpcEvent, deserialize_message};
use crate::error::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Boxed error returned by event callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked for every valid message, with the event and task ID.
pub type EventCallback = Arc<dyn Fn(IpcEvent, &str) -> Result<(), BoxError> + Send + Sync>;

/// Pending connections the kernel queues for us.
pub const SOCKET_BACKLOG: u32 = 5;

/// Bytes requested per read.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Largest undelimited remainder a client may leave buffered.
pub const MAX_BUFFERED_BYTES: usize = 1024 * 1024;

/// Raw line characters included in protocol warnings.
const LOGGED_LINE_CHARS: usize = 100;

#[cfg(unix)]
const SOCKET_FILE_MODE: u32 = 0o600;

/// Errors raised while starting the server.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Local sockets are not available on this platform.
    #[error("unix domain sockets are not available on this platform")]
    Unsupported,

    /// The socket could not be created, bound or listened on.
    #[error("cannot bind monitor socket {}: {source}", path.display())]
    Bind {
        /// Socket path.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// Owner-only permissions could not be applied to the socket.
    #[error("cannot restrict permissions on {}: {source}", path.display())]
    Permissions {
        /// Socket path.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    /// Returns the error classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Transport
    }
}

struct Running {
    token: CancellationToken,
    tracker: TaskTracker,
}

/// Newline-delimited JSON server on a Unix domain socket.
pub struct IpcServer {
    socket_path: PathBuf,
    callback: EventCallback,
    running: Option<Running>,
}

impl std::fmt::Debug for IpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcServer")
            .field("socket_path", &self.socket_path)
            .field("running", &self.running.is_some())
            .finish_non_exhaustive()
    }
}

impl IpcServer {
    /// Creates a stopped server for `socket_path`.
    pub fn new<F>(socket_path: impl Into<PathBuf>, callback: F) -> Self
    where
        F: Fn(IpcEvent, &str) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            socket_path: socket_path.into(),
            callback: Arc::new(callback),
            running: None,
        }
    }

    /// Returns the socket path.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Returns whether the server is accepting connections.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Binds the socket and starts accepting connections.
    ///
    /// A stale socket file is removed first and the new one is restricted
    /// to its owner before any client can connect. Starting a running
    /// server does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the socket cannot be bound or its
    /// permissions cannot be set. No socket file is left behind.
    #[cfg(unix)]
    pub fn start(&mut self) -> Result<(), TransportError> {
        if self.running.is_some() {
            debug!(path = %self.socket_path.display(), "monitor socket already running");
            return Ok(());
        }

        let listener = bind_listener(&self.socket_path).inspect_err(|_| {
            remove_socket_file(&self.socket_path);
        })?;

        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        tracker.spawn(accept_loop(
            listener,
            Arc::clone(&self.callback),
            token.clone(),
            tracker.clone(),
        ));
        info!(path = %self.socket_path.display(), "monitor socket listening");
        self.running = Some(Running { token, tracker });
        Ok(())
    }

    /// Local sockets are unavailable on this platform.
    ///
    /// # Errors
    ///
    /// Always returns [`TransportError::Unsupported`].
    #[cfg(not(unix))]
    pub const fn start(&mut self) -> Result<(), TransportError> {
        Err(TransportError::Unsupported)
    }

    /// Stops every connection handler, closes the listener and removes the
    /// socket file.
    ///
    /// Stopping a stopped server does nothing; the server can be started
    /// again afterwards.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.token.cancel();
        running.tracker.close();
        running.tracker.wait().await;
        remove_socket_file(&self.socket_path);
        info!(path = %self.socket_path.display(), "monitor socket stopped");
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.token.cancel();
            remove_socket_file(&self.socket_path);
        }
    }
}

#[cfg(unix)]
fn bind_listener(path: &Path) -> Result<tokio::net::UnixListener, TransportError> {
    use std::os::unix::fs::PermissionsExt;

    let bind_error = |source| TransportError::Bind {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(bind_error)?;
    }
    if std::fs::symlink_metadata(path).is_ok() {
        info!(path = %path.display(), "removing stale monitor socket");
        std::fs::remove_file(path).map_err(bind_error)?;
    }

    let socket = tokio::net::UnixSocket::new_stream().map_err(bind_error)?;
    socket.bind(path).map_err(bind_error)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(SOCKET_FILE_MODE)).map_err(
        |source| TransportError::Permissions {
            path: path.to_path_buf(),
            source,
        },
    )?;
    socket.listen(SOCKET_BACKLOG).map_err(bind_error)
}

fn remove_socket_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "cannot remove monitor socket"),
    }
}

#[cfg(unix)]
async fn accept_loop(
    listener: tokio::net::UnixListener,
    callback: EventCallback,
    token: CancellationToken,
    tracker: TaskTracker,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            () = token.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, _)) => {
                tracker.spawn(handle_connection(
                    stream,
                    Arc::clone(&callback),
                    token.clone(),
                ));
            }
            Err(_) if token.is_cancelled() => break,
            Err(err) => error!(error = %err, "failed to accept monitor connection"),
        }
    }
    debug!("monitor accept loop finished");
}

#[cfg(unix)]
async fn handle_connection(
    mut stream: tokio::net::UnixStream,
    callback: EventCallback,
    token: CancellationToken,
) {
    use tokio::io::AsyncReadExt;

    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = vec![0_u8; READ_CHUNK_SIZE];
    loop {
        let read = tokio::select! {
            biased;
            () = token.cancelled() => break,
            read = stream.read(&mut chunk) => read,
        };
        let count = match read {
            Ok(0) => break,
            Ok(count) => count,
            Err(err) => {
                debug!(error = %err, "monitor connection closed");
                break;
            }
        };
        buffer.extend(chunk.iter().take(count));

        while let Some(newline) = buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline).collect();
            dispatch_line(&line, &callback);
        }

        if buffer.len() > MAX_BUFFERED_BYTES {
            warn!(
                buffered = buffer.len(),
                limit = MAX_BUFFERED_BYTES,
                "monitor client exceeded buffer limit, disconnecting"
            );
            break;
        }
    }
}

/// Decodes one raw line and invokes the callback, containing every failure.
fn dispatch_line(raw: &[u8], callback: &EventCallback) {
    let text = String::from_utf8_lossy(raw);
    if text.trim().is_empty() {
        return;
    }

    let message = match deserialize_message(&text) {
        Ok(message) => message,
        Err(err) => {
            let preview: String = text.chars().take(LOGGED_LINE_CHARS).collect();
            warn!(error = %err, raw = %preview, "invalid monitor message");
            return;
        }
    };

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        callback(message.event(), message.task_id())
    }));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(
            event = %message.event(),
            task_id = message.task_id(),
            error = %err,
            "monitor callback failed"
        ),
        Err(_) => error!(
            event = %message.event(),
            task_id = message.task_id(),
            "monitor callback panicked"
        ),
    }
}
