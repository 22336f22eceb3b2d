//! Command-line entry point for Jot.
//!
//! Each invocation opens the task database, runs one command and exits.
//! Successful state changes are announced to a running monitor, which is
//! started with `jot monitor`.

use clap::{Args, Parser, Subcommand};
use jot::config::AppPaths;
use jot::error::{ErrorKind, JotError};
use jot::ipc::{IpcClient, IpcServer};
use jot::task::adapters::sqlite::SqliteTaskRepository;
use jot::task::domain::{Task, TaskEventRecord};
use jot::task::services::{
    ActiveConflictPolicy, DeferredEntry, TaskCommandService, TaskSelector,
};
use jot::telemetry;
use mockable::DefaultClock;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

type Service = TaskCommandService<SqliteTaskRepository, IpcClient, DefaultClock>;

/// Track one active task at a time.
#[derive(Debug, Parser)]
#[command(name = "jot", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a new active task.
    Add {
        /// Task description.
        #[arg(required = true, num_args = 1..)]
        description: Vec<String>,
        #[command(flatten)]
        conflict: ConflictArgs,
    },
    /// Complete the active task.
    Done,
    /// Cancel the active task.
    Cancel {
        /// Why the task is cancelled.
        #[arg(required = true, num_args = 1..)]
        reason: Vec<String>,
    },
    /// Set the active task aside for later.
    Defer {
        /// Why the task is deferred.
        #[arg(required = true, num_args = 1..)]
        reason: Vec<String>,
    },
    /// Make a deferred task active again.
    Resume {
        /// Number from `jot deferred`, or a task ID.
        task: String,
        #[command(flatten)]
        conflict: ConflictArgs,
    },
    /// List deferred tasks, oldest first.
    Deferred,
    /// Show the active task.
    Status,
    /// Show the audit trail of a task.
    History {
        /// Number from `jot deferred`, or a task ID; defaults to the active task.
        task: Option<String>,
    },
    /// Receive task notifications until interrupted.
    Monitor,
}

/// How to deal with a task that is already active.
#[derive(Debug, Default, Args)]
#[group(multiple = false)]
struct ConflictArgs {
    /// Complete the active task first.
    #[arg(long)]
    complete_active: bool,
    /// Cancel the active task first, with this reason.
    #[arg(long, value_name = "REASON")]
    cancel_active: Option<String>,
    /// Defer the active task first, with this reason.
    #[arg(long, value_name = "REASON")]
    defer_active: Option<String>,
    /// Add: keep the active task active as well. Resume: defer it.
    #[arg(long)]
    force: bool,
}

impl From<ConflictArgs> for ActiveConflictPolicy {
    fn from(args: ConflictArgs) -> Self {
        if args.force {
            Self::Force
        } else if args.complete_active {
            Self::Complete
        } else if let Some(reason) = args.cancel_active {
            Self::Cancel(reason)
        } else if let Some(reason) = args.defer_active {
            Self::Defer(reason)
        } else {
            Self::Reject
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init();
    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

async fn run(command: Command) -> Result<(), JotError> {
    let paths = AppPaths::from_env()?;
    if matches!(command, Command::Monitor) {
        return monitor(&paths).await;
    }

    let service: Service = TaskCommandService::new(
        Arc::new(SqliteTaskRepository::new(paths.database_path())),
        Arc::new(IpcClient::new(paths.socket_path())),
        Arc::new(DefaultClock),
    );
    let mut out = std::io::stdout().lock();

    match command {
        Command::Add {
            description,
            conflict,
        } => {
            let task = service
                .add(&description.join(" "), &conflict.into())
                .await?;
            writeln!(out, "Added: {}", task.description())?;
        }
        Command::Done => {
            let task = service.done().await?;
            writeln!(out, "Completed: {}", task.description())?;
        }
        Command::Cancel { reason } => {
            let task = service.cancel(&reason.join(" ")).await?;
            writeln!(
                out,
                "Cancelled: {} ({})",
                task.description(),
                task.cancel_reason().unwrap_or_default()
            )?;
        }
        Command::Defer { reason } => {
            let task = service.defer(&reason.join(" ")).await?;
            writeln!(
                out,
                "Deferred: {} ({})",
                task.description(),
                task.defer_reason().unwrap_or_default()
            )?;
        }
        Command::Resume { task, conflict } => {
            let selector = TaskSelector::parse(&task)?;
            let resumed = service.resume(selector, &conflict.into()).await?;
            writeln!(out, "Resumed: {}", resumed.description())?;
        }
        Command::Deferred => write_deferred(&mut out, &service.deferred().await?)?,
        Command::Status => write_status(&mut out, service.status().await?.as_ref())?,
        Command::History { task } => {
            let selector = task.as_deref().map(TaskSelector::parse).transpose()?;
            write_history(&mut out, &service.history(selector).await?)?;
        }
        Command::Monitor => {}
    }
    Ok(())
}

async fn monitor(paths: &AppPaths) -> Result<(), JotError> {
    let mut server = IpcServer::new(paths.socket_path(), |event, task_id: &str| {
        info!(%event, task_id, "task event received");
        writeln!(std::io::stdout().lock(), "{event} {task_id}")?;
        Ok(())
    });
    server.start()?;
    info!(path = %paths.socket_path().display(), "monitor running, press Ctrl-C to stop");

    let signal = tokio::signal::ctrl_c().await;
    server.stop().await;
    signal?;
    Ok(())
}

fn write_deferred(out: &mut impl Write, entries: &[DeferredEntry]) -> std::io::Result<()> {
    if entries.is_empty() {
        return writeln!(out, "No deferred tasks.");
    }
    for entry in entries {
        write!(out, "{:>3}. {}", entry.ordinal, entry.task.description())?;
        if let Some(reason) = entry.task.defer_reason() {
            write!(out, " ({reason})")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn write_status(out: &mut impl Write, task: Option<&Task>) -> std::io::Result<()> {
    let Some(task) = task else {
        return writeln!(out, "No active task.");
    };
    writeln!(out, "Active: {}", task.description())?;
    writeln!(out, "  id:    {}", task.id())?;
    writeln!(out, "  since: {}", task.created_at().to_rfc3339())
}

fn write_history(out: &mut impl Write, events: &[TaskEventRecord]) -> std::io::Result<()> {
    for record in events {
        let event = record.event();
        write!(out, "{}  {}", event.timestamp().to_rfc3339(), event.event_type())?;
        if let Some(reason) = event.reason() {
            write!(out, "  {reason}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn report(err: &JotError) -> ExitCode {
    let kind = err.kind();
    let mut stderr = std::io::stderr().lock();
    let label = match kind {
        ErrorKind::User => "Error",
        ErrorKind::Storage => "Database error",
        ErrorKind::Protocol | ErrorKind::Transport => "System error",
    };
    // Nothing sensible remains if stderr itself is gone.
    if writeln!(stderr, "{label}: {err}").is_ok() {
        if let Some(suggestion) = err.suggestion() {
            writeln!(stderr, "Suggestion: {suggestion}").ok();
        }
    }
    ExitCode::from(kind.exit_code())
}
