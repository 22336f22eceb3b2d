//! Crate-wide error classification.
//!
//! Each layer keeps its own `thiserror` enum; all of them report an
//! [`ErrorKind`] so callers can decide how to surface a failure without
//! inspecting concrete types. [`JotError`] gathers the layer errors for
//! the command-line shell.

use crate::config::ConfigError;
use crate::ipc::{ProtocolError, TransportError};
use crate::task::services::TaskCommandError;
use std::fmt;
use thiserror::Error;

/// Coarse classification of every error the crate produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid input or a request the domain rules forbid.
    User,
    /// The persistent store failed.
    Storage,
    /// A malformed IPC message was received.
    Protocol,
    /// A local socket or stream operation failed.
    Transport,
}

impl ErrorKind {
    /// Process exit status for errors of this kind.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::User => 1,
            Self::Storage | Self::Protocol | Self::Transport => 2,
        }
    }

    /// Returns `true` for faults of the system rather than of the user.
    #[must_use]
    pub const fn is_system(self) -> bool {
        !matches!(self, Self::User)
    }

    /// Returns a short label for diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user error",
            Self::Storage => "storage error",
            Self::Protocol => "protocol error",
            Self::Transport => "transport error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any error surfaced by the `jot` binary.
#[derive(Debug, Error)]
pub enum JotError {
    /// A task command failed.
    #[error(transparent)]
    Command(#[from] TaskCommandError),
    /// Application directories could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// An IPC message was malformed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The IPC socket could not be served.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Writing output or waiting for a signal failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl JotError {
    /// Returns the error classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Command(err) => err.kind(),
            Self::Config(err) => err.kind(),
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Transport(_) | Self::Io(_) => ErrorKind::Transport,
        }
    }

    /// Returns a follow-up hint for the user, if one applies.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Command(err) => err.suggestion(),
            Self::Config(_) | Self::Protocol(_) | Self::Transport(_) | Self::Io(_) => None,
        }
    }
}
