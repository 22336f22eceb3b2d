//! Schema migration tests.

use crate::sqlite::helpers::{TestDb, columns, db, indexes, new_task};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Text;
use jot::task::adapters::sqlite::{
    CURRENT_SCHEMA_VERSION, establish, migrate_schema, open_connection, schema_version,
};
use jot::task::domain::{TaskEvent, TaskEventType, TaskState};
use jot::task::ports::{EventRepository, TaskRepository, TaskRepositoryError};
use rstest::rstest;

const TASK_COLUMNS: [&str; 11] = [
    "id",
    "description",
    "state",
    "created_at",
    "updated_at",
    "completed_at",
    "deferred_until",
    "cancelled_at",
    "cancel_reason",
    "deferred_at",
    "defer_reason",
];

const VERSION_ONE_SQL: &str = "
    CREATE TABLE tasks (
        id TEXT PRIMARY KEY NOT NULL,
        description TEXT NOT NULL,
        state TEXT NOT NULL CHECK (state IN ('active', 'completed', 'cancelled', 'deferred')),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        completed_at TEXT,
        deferred_until TEXT
    );
    CREATE INDEX idx_tasks_state ON tasks(state);
    CREATE TABLE task_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        event_type TEXT NOT NULL
            CHECK (event_type IN ('CREATED', 'COMPLETED', 'CANCELLED', 'DEFERRED')),
        timestamp TEXT NOT NULL,
        metadata TEXT
    );
    CREATE INDEX idx_task_events_task_id ON task_events(task_id);
    INSERT INTO tasks (id, description, state, created_at, updated_at)
        VALUES ('6f1c3f4e-8d2a-4f0b-9a57-2b1d0e3c4a5b', 'Legacy task', 'active',
                '2024-06-01T08:00:00.000000Z', '2024-06-01T08:00:00.000000Z');
    INSERT INTO task_events (task_id, event_type, timestamp)
        VALUES ('6f1c3f4e-8d2a-4f0b-9a57-2b1d0e3c4a5b', 'CREATED', '2024-06-01T08:00:00.000000Z');
    PRAGMA user_version = 1;
";

#[derive(QueryableByName)]
struct JournalRow {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}

#[rstest]
fn fresh_database_reaches_current_version(db: TestDb) {
    let mut conn = open_connection(&db.path).expect("open");

    assert_eq!(schema_version(&mut conn).expect("version"), CURRENT_SCHEMA_VERSION);
    assert_eq!(columns(&mut conn, "tasks"), TASK_COLUMNS);
    assert_eq!(
        columns(&mut conn, "task_events"),
        ["id", "task_id", "event_type", "timestamp", "metadata"]
    );
    let names = indexes(&mut conn);
    assert!(names.iter().any(|name| name == "idx_tasks_state"));
    assert!(names.iter().any(|name| name == "idx_task_events_task_id"));
}

#[rstest]
fn connection_uses_write_ahead_log(db: TestDb) {
    let mut conn = open_connection(&db.path).expect("open");
    let row = diesel::sql_query("PRAGMA journal_mode")
        .get_result::<JournalRow>(&mut conn)
        .expect("journal mode");
    assert_eq!(row.journal_mode.to_lowercase(), "wal");
}

#[cfg(unix)]
#[rstest]
fn database_file_is_owner_only(db: TestDb) {
    use std::os::unix::fs::PermissionsExt;

    drop(open_connection(&db.path).expect("open"));
    let mode = std::fs::metadata(&db.path)
        .expect("metadata")
        .permissions()
        .mode()
        & 0o777;
    assert_eq!(mode, 0o600);
}

#[rstest]
fn unmigrated_database_reports_version_zero(db: TestDb) {
    let mut conn = establish(&db.path).expect("establish");
    assert_eq!(schema_version(&mut conn).expect("version"), 0);
}

#[rstest]
fn migration_is_idempotent(db: TestDb) {
    let mut conn = establish(&db.path).expect("establish");
    for _ in 0..3 {
        migrate_schema(&mut conn).expect("migrate");
    }
    assert_eq!(schema_version(&mut conn).expect("version"), CURRENT_SCHEMA_VERSION);
    assert_eq!(columns(&mut conn, "tasks"), TASK_COLUMNS);

    drop(conn);
    let mut reopened = open_connection(&db.path).expect("reopen");
    assert_eq!(columns(&mut reopened, "tasks"), TASK_COLUMNS);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn version_one_store_is_upgraded_in_place(db: TestDb) {
    let mut legacy_conn = establish(&db.path).expect("establish");
    legacy_conn.batch_execute(VERSION_ONE_SQL).expect("legacy schema");
    drop(legacy_conn);

    let mut upgraded = open_connection(&db.path).expect("upgrade");
    assert_eq!(schema_version(&mut upgraded).expect("version"), CURRENT_SCHEMA_VERSION);
    for column in ["cancelled_at", "cancel_reason", "deferred_at", "defer_reason"] {
        assert!(columns(&mut upgraded, "tasks").iter().any(|name| name == column));
    }
    drop(upgraded);

    let legacy = db.repo.get_active_task().await.expect("active").expect("legacy task");
    assert_eq!(legacy.description().as_str(), "Legacy task");
    assert_eq!(legacy.state(), TaskState::Active);

    let history = db.repo.get_events_for_task(legacy.id()).await.expect("events");
    assert_eq!(history.len(), 1);

    // The rebuilt events table accepts RESUMED.
    let resumed = TaskEvent::new(legacy.id(), TaskEventType::Resumed, legacy.created_at());
    db.repo.create_event(&resumed).await.expect("resumed event");
}

#[rstest]
fn failed_step_rolls_back_version(db: TestDb) {
    let mut conn = establish(&db.path).expect("establish");
    // Claims version 1 without the tables step 2 alters.
    conn.batch_execute("PRAGMA user_version = 1;").expect("version");

    let err = migrate_schema(&mut conn).expect_err("step 2 cannot alter a missing table");

    assert!(matches!(err, TaskRepositoryError::Migration { version: 2, .. }));
    assert_eq!(schema_version(&mut conn).expect("version"), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn repository_creates_database_on_first_use(db: TestDb) {
    assert!(!db.path.exists());
    db.repo.create_task(&new_task("First ever")).await.expect("create");
    assert!(db.path.exists());
}
