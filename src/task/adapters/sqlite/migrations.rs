//! Versioned, idempotent schema migrations.
//!
//! The schema version lives in SQLite's `user_version` header field. Each
//! step checks for the objects it creates before creating them, so
//! re-running a step against a partially migrated file is harmless. All
//! pending steps and the version bump run inside a single immediate
//! transaction: a failure leaves the file at its previous version.

use crate::task::ports::{TaskRepositoryError, TaskRepositoryResult};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::{Integer, Nullable, Text};
use diesel::sqlite::SqliteConnection;
use tracing::info;

/// Schema version produced by [`migrate_schema`].
pub const CURRENT_SCHEMA_VERSION: i32 = 4;

const CREATE_TASKS_SQL: &str = "
    CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY NOT NULL,
        description TEXT NOT NULL,
        state TEXT NOT NULL CHECK (state IN ('active', 'completed', 'cancelled', 'deferred')),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        completed_at TEXT,
        deferred_until TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_tasks_state ON tasks(state);
";

const CREATE_TASK_EVENTS_SQL: &str = "
    CREATE TABLE IF NOT EXISTS task_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        event_type TEXT NOT NULL
            CHECK (event_type IN ('CREATED', 'COMPLETED', 'CANCELLED', 'DEFERRED', 'RESUMED')),
        timestamp TEXT NOT NULL,
        metadata TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_task_events_task_id ON task_events(task_id);
";

const REBUILD_TASK_EVENTS_SQL: &str = "
    CREATE TABLE task_events_new (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        event_type TEXT NOT NULL
            CHECK (event_type IN ('CREATED', 'COMPLETED', 'CANCELLED', 'DEFERRED', 'RESUMED')),
        timestamp TEXT NOT NULL,
        metadata TEXT
    );
    INSERT INTO task_events_new (id, task_id, event_type, timestamp, metadata)
        SELECT id, task_id, event_type, timestamp, metadata FROM task_events;
    DROP TABLE task_events;
    ALTER TABLE task_events_new RENAME TO task_events;
    CREATE INDEX IF NOT EXISTS idx_task_events_task_id ON task_events(task_id);
";

#[derive(QueryableByName)]
struct UserVersionRow {
    #[diesel(sql_type = Integer)]
    user_version: i32,
}

#[derive(QueryableByName)]
struct ColumnInfoRow {
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(QueryableByName)]
struct TableSqlRow {
    #[diesel(sql_type = Nullable<Text>)]
    sql: Option<String>,
}

/// Reads the schema version stored in the database header.
///
/// Returns `0` for a database that has never been migrated.
///
/// # Errors
///
/// Returns a persistence error when the pragma cannot be read.
pub fn schema_version(connection: &mut SqliteConnection) -> TaskRepositoryResult<i32> {
    let row = diesel::sql_query("PRAGMA user_version").get_result::<UserVersionRow>(connection)?;
    Ok(row.user_version)
}

/// Applies every pending migration step in increasing order.
///
/// Calling this on a database already at [`CURRENT_SCHEMA_VERSION`] is a
/// no-op.
///
/// # Errors
///
/// Returns [`TaskRepositoryError::Migration`] naming the step that failed.
/// The transaction is rolled back and the stored version is unchanged.
pub fn migrate_schema(connection: &mut SqliteConnection) -> TaskRepositoryResult<()> {
    if schema_version(connection)? >= CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    connection.immediate_transaction::<_, TaskRepositoryError, _>(|conn| {
        // Another process may have migrated while we waited for the lock.
        let from_version = schema_version(conn)?;
        if from_version >= CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        let steps: [(i32, MigrationStep); 4] = [
            (1, create_base_tables),
            (2, add_cancellation_columns),
            (3, add_deferral_columns),
            (4, allow_resumed_events),
        ];
        for (version, step) in steps {
            if from_version < version {
                step(conn).map_err(|err| TaskRepositoryError::migration(version, err))?;
            }
        }

        conn.batch_execute(&format!("PRAGMA user_version = {CURRENT_SCHEMA_VERSION}"))
            .map_err(|err| TaskRepositoryError::migration(CURRENT_SCHEMA_VERSION, err))?;
        info!(
            from = from_version,
            to = CURRENT_SCHEMA_VERSION,
            "migrated task database schema"
        );
        Ok(())
    })
}

type MigrationStep = fn(&mut SqliteConnection) -> QueryResult<()>;

fn create_base_tables(connection: &mut SqliteConnection) -> QueryResult<()> {
    connection.batch_execute(CREATE_TASKS_SQL)?;
    connection.batch_execute(CREATE_TASK_EVENTS_SQL)
}

fn add_cancellation_columns(connection: &mut SqliteConnection) -> QueryResult<()> {
    add_missing_columns(connection, &["cancelled_at", "cancel_reason"])
}

fn add_deferral_columns(connection: &mut SqliteConnection) -> QueryResult<()> {
    add_missing_columns(connection, &["deferred_at", "defer_reason", "deferred_until"])
}

/// Rebuilds `task_events` when its CHECK constraint predates `RESUMED`.
fn allow_resumed_events(connection: &mut SqliteConnection) -> QueryResult<()> {
    let table_sql = diesel::sql_query(
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'task_events'",
    )
    .get_result::<TableSqlRow>(connection)
    .optional()?
    .and_then(|row| row.sql);

    match table_sql {
        Some(sql) if sql.contains("'RESUMED'") => Ok(()),
        Some(_) => connection.batch_execute(REBUILD_TASK_EVENTS_SQL),
        None => connection.batch_execute(CREATE_TASK_EVENTS_SQL),
    }
}

/// Adds nullable `TEXT` columns to `tasks` unless they already exist.
fn add_missing_columns(connection: &mut SqliteConnection, columns: &[&str]) -> QueryResult<()> {
    let existing = table_columns(connection, "tasks")?;
    for column in columns {
        if !existing.iter().any(|name| name == column) {
            connection.batch_execute(&format!("ALTER TABLE tasks ADD COLUMN {column} TEXT"))?;
        }
    }
    Ok(())
}

/// Returns the column names of `table`.
///
/// `table` must be a trusted identifier; it is interpolated into the pragma.
fn table_columns(
    connection: &mut SqliteConnection,
    table: &str,
) -> QueryResult<Vec<String>> {
    let rows = diesel::sql_query(format!("PRAGMA table_info({table})"))
        .load::<ColumnInfoRow>(connection)?;
    Ok(rows.into_iter().map(|row| row.name).collect())
}
