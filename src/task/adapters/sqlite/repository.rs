//! SQLite-backed task and event repository.

use super::{
    connection::open_connection,
    models::{EventRow, NewEventRow, TaskRow},
    schema::{task_events, tasks},
};
use crate::task::{
    domain::{EventId, Task, TaskEvent, TaskEventRecord, TaskId, TaskState},
    ports::{EventRepository, TaskRepository, TaskRepositoryError, TaskRepositoryResult},
};
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::BigInt;
use diesel::sqlite::SqliteConnection;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Task repository persisting to a single SQLite file.
///
/// Each operation opens its own connection on the blocking pool, runs in
/// one transaction where it writes, and closes the connection afterwards.
/// Several processes may share the file; SQLite's locking arbitrates.
#[derive(Debug, Clone)]
pub struct SqliteTaskRepository {
    path: Arc<PathBuf>,
}

impl SqliteTaskRepository {
    /// Creates a repository for the database file at `path`.
    ///
    /// Nothing is opened until the first operation, which also creates and
    /// migrates the file when needed.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }

    /// Returns the database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskRepositoryResult<T>
    where
        F: FnOnce(&mut SqliteConnection) -> TaskRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = Arc::clone(&self.path);
        tokio::task::spawn_blocking(move || {
            let mut connection = open_connection(&path)?;
            f(&mut connection)
        })
        .await
        .map_err(TaskRepositoryError::persistence)?
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create_task(&self, task: &Task) -> TaskRepositoryResult<()> {
        let task_id = task.id();
        let task_row = TaskRow::from(task);
        let event_row = NewEventRow::from(&task.creation_event());

        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskRepositoryError, _>(|conn| {
                diesel::insert_into(tasks::table)
                    .values(&task_row)
                    .execute(conn)
                    .map_err(|err| match err {
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                            TaskRepositoryError::DuplicateTask(task_id)
                        }
                        _ => TaskRepositoryError::persistence(err),
                    })?;
                insert_event(conn, &event_row)?;
                Ok(())
            })
        })
        .await
    }

    async fn get_task_by_id(&self, id: TaskId) -> TaskRepositoryResult<Task> {
        self.run_blocking(move |connection| {
            let row = tasks::table
                .find(id.to_string())
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()?;
            row.ok_or(TaskRepositoryError::NotFound(id))
                .and_then(Task::try_from)
        })
        .await
    }

    async fn get_active_task(&self) -> TaskRepositoryResult<Option<Task>> {
        self.run_blocking(|connection| {
            let row = tasks::table
                .filter(tasks::state.eq(TaskState::Active.as_str()))
                .order((tasks::created_at.asc(), tasks::id.asc()))
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()?;
            row.map(Task::try_from).transpose()
        })
        .await
    }

    async fn get_deferred_tasks(&self) -> TaskRepositoryResult<Vec<Task>> {
        self.run_blocking(|connection| {
            let rows = tasks::table
                .filter(tasks::state.eq(TaskState::Deferred.as_str()))
                .order((tasks::deferred_at.asc(), tasks::id.asc()))
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)?;
            rows.into_iter().map(Task::try_from).collect()
        })
        .await
    }

    async fn update_task(&self, task: &Task) -> TaskRepositoryResult<()> {
        let task_id = task.id();
        let row = TaskRow::from(task);
        self.run_blocking(move |connection| update_row(connection, task_id, &row))
            .await
    }

    async fn update_task_with_event(
        &self,
        task: &Task,
        event: &TaskEvent,
    ) -> TaskRepositoryResult<TaskEventRecord> {
        let task_id = task.id();
        let row = TaskRow::from(task);
        let event_row = NewEventRow::from(event);
        let recorded = event.clone();

        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskRepositoryError, _>(|conn| {
                update_row(conn, task_id, &row)?;
                let id = insert_event(conn, &event_row)?;
                Ok(TaskEventRecord::new(id, recorded))
            })
        })
        .await
    }
}

#[async_trait]
impl EventRepository for SqliteTaskRepository {
    async fn create_event(&self, event: &TaskEvent) -> TaskRepositoryResult<TaskEventRecord> {
        let event_row = NewEventRow::from(event);
        let recorded = event.clone();
        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskRepositoryError, _>(|conn| {
                let id = insert_event(conn, &event_row)?;
                Ok(TaskEventRecord::new(id, recorded))
            })
        })
        .await
    }

    async fn get_events_for_task(&self, id: TaskId) -> TaskRepositoryResult<Vec<TaskEventRecord>> {
        self.run_blocking(move |connection| {
            let rows = task_events::table
                .filter(task_events::task_id.eq(id.to_string()))
                .order((task_events::timestamp.asc(), task_events::id.asc()))
                .select(EventRow::as_select())
                .load::<EventRow>(connection)?;
            rows.into_iter().map(TaskEventRecord::try_from).collect()
        })
        .await
    }
}

fn update_row(
    connection: &mut SqliteConnection,
    task_id: TaskId,
    row: &TaskRow,
) -> TaskRepositoryResult<()> {
    let affected = diesel::update(tasks::table.find(task_id.to_string()))
        .set(row)
        .execute(connection)?;
    if affected == 0 {
        return Err(TaskRepositoryError::NotFound(task_id));
    }
    Ok(())
}

/// Inserts an event row and returns the identifier the store assigned.
fn insert_event(
    connection: &mut SqliteConnection,
    row: &NewEventRow,
) -> TaskRepositoryResult<EventId> {
    diesel::insert_into(task_events::table)
        .values(row)
        .execute(connection)?;
    let id = diesel::select(diesel::dsl::sql::<BigInt>("last_insert_rowid()"))
        .get_result::<i64>(connection)?;
    Ok(EventId::new(id))
}
