//! Repository behaviour against a real database file.

use crate::sqlite::helpers::{TestDb, db, new_task, now, persisted};
use chrono::Duration;
use diesel::prelude::*;
use diesel::sql_types::Text;
use jot::task::adapters::sqlite::{format_timestamp, open_connection};
use jot::task::domain::{
    Reason, Task, TaskDescription, TaskEvent, TaskEventType, TaskId, TaskState, TaskTransition,
};
use jot::task::ports::{EventRepository, TaskRepository, TaskRepositoryError};
use mockable::DefaultClock;
use rstest::rstest;

#[derive(QueryableByName)]
struct StoredTimestamps {
    #[diesel(sql_type = Text)]
    created_at: String,
    #[diesel(sql_type = Text)]
    updated_at: String,
}

fn reason(value: &str, transition: TaskTransition) -> Reason {
    Reason::new(value, transition).expect("valid reason")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn created_task_round_trips_every_field(db: TestDb) {
    let created_at = now() - Duration::hours(2);
    let mut data = persisted(TaskState::Cancelled, created_at);
    data.updated_at = created_at + Duration::minutes(30);
    data.cancelled_at = Some(data.updated_at);
    data.cancel_reason = Some("Superseded".to_owned());
    data.deferred_at = Some(created_at + Duration::minutes(10));
    data.defer_reason = Some("Blocked earlier".to_owned());
    data.deferred_until = Some(created_at + Duration::days(1));
    let task = Task::from_persisted(data);

    db.repo.create_task(&task).await.expect("create");
    let loaded = db.repo.get_task_by_id(task.id()).await.expect("load");

    assert_eq!(loaded, task);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_records_creation_event(db: TestDb) {
    let task = new_task("Write the release notes");
    db.repo.create_task(&task).await.expect("create");

    let events = db.repo.get_events_for_task(task.id()).await.expect("events");

    assert_eq!(events.len(), 1);
    let event = events.first().expect("creation event").event();
    assert_eq!(event.event_type(), TaskEventType::Created);
    assert_eq!(event.timestamp(), task.created_at());
    assert_eq!(event.metadata(), None);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn duplicate_identifier_is_rejected(db: TestDb) {
    let task = new_task("Only once");
    db.repo.create_task(&task).await.expect("first create");

    let err = db.repo.create_task(&task).await.expect_err("duplicate");

    assert!(matches!(err, TaskRepositoryError::DuplicateTask(id) if id == task.id()));
    let events = db.repo.get_events_for_task(task.id()).await.expect("events");
    assert_eq!(events.len(), 1, "the failed insert must not leave an event");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_task_is_not_found(db: TestDb) {
    let missing = TaskId::new();

    let load = db.repo.get_task_by_id(missing).await.expect_err("load");
    assert!(matches!(load, TaskRepositoryError::NotFound(id) if id == missing));

    let ghost = new_task("Never stored");
    let update = db.repo.update_task(&ghost).await.expect_err("update");
    assert!(matches!(update, TaskRepositoryError::NotFound(id) if id == ghost.id()));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn event_for_unknown_task_is_rejected(db: TestDb) {
    let event = TaskEvent::new(TaskId::new(), TaskEventType::Completed, now());

    let err = db.repo.create_event(&event).await.expect_err("foreign key");

    assert!(matches!(err, TaskRepositoryError::Persistence(_)));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_event_insert_rolls_back_task_update(db: TestDb) {
    let mut task = new_task("Atomic change");
    db.repo.create_task(&task).await.expect("create");
    task.complete(&DefaultClock).expect("complete");
    // The event points at another task, so the foreign key fails.
    let orphan = TaskEvent::new(TaskId::new(), TaskEventType::Completed, now());

    db.repo
        .update_task_with_event(&task, &orphan)
        .await
        .expect_err("orphan event");

    let stored = db.repo.get_task_by_id(task.id()).await.expect("load");
    assert_eq!(stored.state(), TaskState::Active);
    assert_eq!(stored.completed_at(), None);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn transition_persists_task_and_event_together(db: TestDb) {
    let mut task = new_task("Investigate flaky build");
    db.repo.create_task(&task).await.expect("create");
    let event = task
        .defer(&reason("Waiting on CI", TaskTransition::Defer), &DefaultClock)
        .expect("defer");

    let record = db
        .repo
        .update_task_with_event(&task, &event)
        .await
        .expect("persist");

    let stored = db.repo.get_task_by_id(task.id()).await.expect("load");
    assert_eq!(stored, task);
    let events = db.repo.get_events_for_task(task.id()).await.expect("events");
    let last = events.last().expect("deferred event");
    assert_eq!(last.id(), record.id());
    assert_eq!(last.event().reason().as_deref(), Some("Waiting on CI"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn events_are_ordered_by_timestamp_then_id(db: TestDb) {
    let task = new_task("Ordered history");
    db.repo.create_task(&task).await.expect("create");
    let base = task.created_at();
    let at = |seconds| base + Duration::seconds(seconds);

    let later = TaskEvent::new(task.id(), TaskEventType::Deferred, at(20));
    let earlier = TaskEvent::new(task.id(), TaskEventType::Resumed, at(10));
    let tie = TaskEvent::new(task.id(), TaskEventType::Completed, at(20));
    for event in [&later, &earlier, &tie] {
        db.repo.create_event(event).await.expect("event");
    }

    let types: Vec<_> = db
        .repo
        .get_events_for_task(task.id())
        .await
        .expect("events")
        .iter()
        .map(|record| record.event().event_type())
        .collect();

    assert_eq!(
        types,
        [
            TaskEventType::Created,
            TaskEventType::Resumed,
            TaskEventType::Deferred,
            TaskEventType::Completed,
        ]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn active_and_deferred_queries_follow_their_order(db: TestDb) {
    let base = now() - Duration::hours(1);

    let mut second_active = persisted(TaskState::Active, base + Duration::minutes(5));
    second_active.description = TaskDescription::new("Newer active").expect("description");
    let first_active = persisted(TaskState::Active, base);

    let mut late_deferred = persisted(TaskState::Deferred, base);
    late_deferred.deferred_at = Some(base + Duration::minutes(20));
    let mut early_deferred = persisted(TaskState::Deferred, base + Duration::minutes(1));
    early_deferred.deferred_at = Some(base + Duration::minutes(10));

    let tasks: Vec<Task> = [second_active, first_active, late_deferred, early_deferred]
        .into_iter()
        .map(Task::from_persisted)
        .collect();
    for task in &tasks {
        db.repo.create_task(task).await.expect("create");
    }
    let [newer, older, late, early] = [0, 1, 2, 3].map(|index| tasks[index].id());

    let active = db.repo.get_active_task().await.expect("active").expect("some active");
    assert_eq!(active.id(), older);
    assert_ne!(active.id(), newer);

    let deferred: Vec<_> = db
        .repo
        .get_deferred_tasks()
        .await
        .expect("deferred")
        .iter()
        .map(Task::id)
        .collect();
    assert_eq!(deferred, [early, late]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn timestamps_are_stored_with_microseconds(db: TestDb) {
    let task = new_task("Precise");
    db.repo.create_task(&task).await.expect("create");

    let mut conn = open_connection(&db.path).expect("open");
    let row = diesel::sql_query("SELECT created_at, updated_at FROM tasks WHERE id = ?")
        .bind::<Text, _>(task.id().to_string())
        .get_result::<StoredTimestamps>(&mut conn)
        .expect("row");

    assert_eq!(row.created_at, format_timestamp(task.created_at()));
    assert_eq!(row.updated_at, row.created_at);
    assert!(row.created_at.ends_with('Z'));
    let fraction = row
        .created_at
        .rsplit_once('.')
        .map(|(_, rest)| rest.trim_end_matches('Z'))
        .expect("fractional seconds");
    assert_eq!(fraction.len(), 6);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_writers_do_not_lose_tasks(db: TestDb) {
    // Create the file first so the writers race on rows, not on setup.
    db.repo.create_task(&new_task("Seed")).await.expect("seed");

    let handles: Vec<_> = (0..8)
        .map(|index| {
            let repo = db.repo.clone();
            tokio::spawn(async move {
                let task = new_task(&format!("Parallel task {index}"));
                repo.create_task(&task).await.map(|()| task.id())
            })
        })
        .collect();

    for handle in handles {
        let id = handle.await.expect("join").expect("create");
        let events = db.repo.get_events_for_task(id).await.expect("events");
        assert_eq!(events.len(), 1);
    }
}
