//! Shared helpers for SQLite integration tests.

use chrono::{DateTime, SubsecRound, Utc};
use diesel::prelude::*;
use diesel::sql_types::Text;
use jot::task::adapters::sqlite::SqliteTaskRepository;
use jot::task::domain::{PersistedTaskData, Task, TaskDescription, TaskId, TaskState};
use mockable::DefaultClock;
use rstest::fixture;
use std::path::PathBuf;
use tempfile::TempDir;

/// A repository on a database file inside a private temporary directory.
pub struct TestDb {
    /// Keeps the directory alive for the test.
    pub _dir: TempDir,
    /// Database file path.
    pub path: PathBuf,
    /// Repository under test.
    pub repo: SqliteTaskRepository,
}

/// Provides a fresh, not yet created database.
#[fixture]
pub fn db() -> TestDb {
    let dir = TempDir::new().expect("temporary directory");
    let path = dir.path().join("data").join("jot.db");
    let repo = SqliteTaskRepository::new(&path);
    TestDb {
        _dir: dir,
        path,
        repo,
    }
}

/// Creates an active task stamped with the system clock.
pub fn new_task(description: &str) -> Task {
    Task::new(
        TaskDescription::new(description).expect("valid description"),
        &DefaultClock,
    )
}

/// Current time at storage precision.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Persisted task data in `state`, created at `created_at`.
pub fn persisted(state: TaskState, created_at: DateTime<Utc>) -> PersistedTaskData {
    PersistedTaskData {
        id: TaskId::new(),
        description: TaskDescription::new("Persisted task").expect("valid description"),
        state,
        created_at,
        updated_at: created_at,
        completed_at: None,
        cancelled_at: None,
        cancel_reason: None,
        deferred_at: None,
        defer_reason: None,
        deferred_until: None,
    }
}

#[derive(QueryableByName)]
struct NameRow {
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(QueryableByName)]
struct DetailRow {
    #[diesel(sql_type = Text)]
    detail: String,
}

/// Returns the column names of `table`.
pub fn columns(conn: &mut SqliteConnection, table: &str) -> Vec<String> {
    diesel::sql_query(format!("PRAGMA table_info({table})"))
        .load::<NameRow>(conn)
        .expect("table_info")
        .into_iter()
        .map(|row| row.name)
        .collect()
}

/// Returns the names of all indexes in the database.
pub fn indexes(conn: &mut SqliteConnection) -> Vec<String> {
    diesel::sql_query("SELECT name FROM sqlite_master WHERE type = 'index'")
        .load::<NameRow>(conn)
        .expect("sqlite_master")
        .into_iter()
        .map(|row| row.name)
        .collect()
}

/// Returns the query plan details for `sql`.
pub fn query_plan(conn: &mut SqliteConnection, sql: &str) -> Vec<String> {
    diesel::sql_query(format!("EXPLAIN QUERY PLAN {sql}"))
        .load::<DetailRow>(conn)
        .expect("query plan")
        .into_iter()
        .map(|row| row.detail)
        .collect()
}
