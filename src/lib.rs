//! Jot: a single-active-task tracker.
//!
//! Jot keeps one task in focus at a time. Tasks are created active and
//! then completed, cancelled or deferred; deferred tasks can be resumed
//! later. Every state change is stored together with an audit event in an
//! embedded SQLite database, and a running monitor process is notified
//! over a local socket.
//!
//! # Architecture
//!
//! Jot follows hexagonal architecture principles:
//!
//! - **Domain**: the task aggregate and its state machine
//! - **Ports**: repository and notifier traits
//! - **Adapters**: SQLite and in-memory repositories, the IPC client
//!
//! # Modules
//!
//! - [`task`]: task lifecycle, persistence and command orchestration
//! - [`ipc`]: newline-delimited JSON messaging with the monitor
//! - [`config`]: per-user directory resolution
//! - [`error`]: crate-wide error classification
//! - [`telemetry`]: tracing subscriber set-up

pub mod config;
pub mod error;
pub mod ipc;
pub mod task;
pub mod telemetry;
