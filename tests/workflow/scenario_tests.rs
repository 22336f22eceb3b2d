//! Lifecycle scenarios driven through the command service.

use crate::workflow::helpers::{Workflow, workflow};
use eyre::{Result, ensure};
use jot::error::ErrorKind;
use jot::ipc::{ProtocolError, deserialize_message};
use jot::task::domain::{TaskEventType, TaskState};
use jot::task::ports::{EventRepository, TaskRepository};
use jot::task::services::{ActiveConflictPolicy, TaskCommandError, TaskSelector};
use rstest::rstest;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn created_task_becomes_active_with_one_event(workflow: Workflow) -> Result<()> {
    let task = workflow.service.add("Buy milk", &ActiveConflictPolicy::Reject).await?;

    let active = workflow.service.status().await?;
    ensure!(active.as_ref() == Some(&task), "status returned {active:?}");
    ensure!(task.state() == TaskState::Active);
    ensure!(task.description().as_str() == "Buy milk");

    let events = workflow.repo.get_events_for_task(task.id()).await?;
    let types: Vec<_> = events.iter().map(|record| record.event().event_type()).collect();
    ensure!(types == [TaskEventType::Created], "unexpected events {types:?}");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn completing_records_matching_timestamp(workflow: Workflow) -> Result<()> {
    workflow.service.add("Ship release", &ActiveConflictPolicy::Reject).await?;
    workflow.clock.advance(90);

    let done = workflow.service.done().await?;

    ensure!(done.state() == TaskState::Completed);
    let completed_at = done.completed_at().ok_or_else(|| eyre::eyre!("completed_at unset"))?;
    let stored = workflow.repo.get_task_by_id(done.id()).await?;
    ensure!(stored == done, "stored task differs: {stored:?}");

    let events = workflow.repo.get_events_for_task(done.id()).await?;
    let completed: Vec<_> = events
        .iter()
        .filter(|record| record.event().event_type() == TaskEventType::Completed)
        .collect();
    ensure!(completed.len() == 1);
    ensure!(completed.first().map(|record| record.event().timestamp()) == Some(completed_at));
    ensure!(workflow.service.status().await?.is_none());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn deferring_stores_reason_in_task_and_event(workflow: Workflow) -> Result<()> {
    workflow.service.add("Integrate payments", &ActiveConflictPolicy::Reject).await?;

    let deferred = workflow.service.defer("waiting for API").await?;

    ensure!(deferred.state() == TaskState::Deferred);
    ensure!(deferred.defer_reason() == Some("waiting for API"));
    let events = workflow.repo.get_events_for_task(deferred.id()).await?;
    let last = events.last().ok_or_else(|| eyre::eyre!("no events"))?.event();
    ensure!(last.event_type() == TaskEventType::Deferred);
    ensure!(last.metadata() == Some(r#"{"reason":"waiting for API"}"#), "{:?}", last.metadata());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn resuming_first_ordinal_picks_oldest_deferral(workflow: Workflow) -> Result<()> {
    let older = workflow.service.add("First", &ActiveConflictPolicy::Reject).await?;
    workflow.service.defer("later").await?;
    workflow.clock.advance(10);
    let newer = workflow.service.add("Second", &ActiveConflictPolicy::Reject).await?;
    workflow.service.defer("much later").await?;

    let listed: Vec<_> = workflow
        .service
        .deferred()
        .await?
        .into_iter()
        .map(|entry| (entry.ordinal, entry.task.id()))
        .collect();
    ensure!(listed == [(1, older.id()), (2, newer.id())], "listed {listed:?}");

    let resumed = workflow
        .service
        .resume(TaskSelector::parse("1")?, &ActiveConflictPolicy::Reject)
        .await?;
    ensure!(resumed.id() == older.id());
    ensure!(resumed.state() == TaskState::Active);
    ensure!(resumed.deferred_at().is_none() && resumed.defer_reason().is_none());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn conflict_policies_settle_the_previous_task(workflow: Workflow) -> Result<()> {
    let first = workflow.service.add("First", &ActiveConflictPolicy::Reject).await?;

    let rejected = workflow
        .service
        .add("Second", &ActiveConflictPolicy::Reject)
        .await
        .expect_err("an active task exists");
    ensure!(matches!(
        rejected,
        TaskCommandError::ActiveTaskExists { task_id, .. } if task_id == first.id()
    ));
    ensure!(rejected.kind() == ErrorKind::User);

    let policy = ActiveConflictPolicy::Cancel("Superseded".to_owned());
    let second = workflow.service.add("Second", &policy).await?;

    let first_now = workflow.repo.get_task_by_id(first.id()).await?;
    ensure!(first_now.state() == TaskState::Cancelled);
    ensure!(first_now.cancel_reason() == Some("Superseded"));
    ensure!(workflow.service.status().await? == Some(second));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn blank_reason_leaves_store_untouched(workflow: Workflow) -> Result<()> {
    let task = workflow.service.add("Keep going", &ActiveConflictPolicy::Reject).await?;

    let err = workflow.service.cancel("   ").await.expect_err("blank reason");

    ensure!(err.kind() == ErrorKind::User);
    ensure!(workflow.repo.get_task_by_id(task.id()).await? == task);
    ensure!(workflow.repo.get_events_for_task(task.id()).await?.len() == 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn history_of_resumed_task_is_chronological(workflow: Workflow) -> Result<()> {
    let task = workflow.service.add("Round trip", &ActiveConflictPolicy::Reject).await?;
    workflow.clock.advance(5);
    workflow.service.defer("blocked").await?;
    workflow.clock.advance(5);
    workflow
        .service
        .resume(TaskSelector::Id(task.id()), &ActiveConflictPolicy::Reject)
        .await?;
    workflow.clock.advance(5);
    workflow.service.done().await?;

    let history = workflow
        .service
        .history(Some(TaskSelector::parse(&task.id().to_string())?))
        .await?;
    let types: Vec<_> = history.iter().map(|record| record.event().event_type()).collect();

    ensure!(
        types
            == [
                TaskEventType::Created,
                TaskEventType::Deferred,
                TaskEventType::Resumed,
                TaskEventType::Completed,
            ],
        "history {types:?}"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn commands_succeed_without_a_monitor(workflow: Workflow) -> Result<()> {
    ensure!(!workflow.paths.socket_path().exists());

    workflow.service.add("Unobserved", &ActiveConflictPolicy::Reject).await?;
    workflow.service.done().await?;

    ensure!(workflow.service.status().await?.is_none());
    Ok(())
}

#[rstest]
fn unknown_event_name_is_a_protocol_error() {
    let line = "{\"event\":\"BOGUS\",\"task_id\":\"x\",\"timestamp\":\"2024-01-01T00:00:00Z\"}\n";

    let err = deserialize_message(line).expect_err("unknown event");

    assert!(matches!(&err, ProtocolError::UnknownEvent(name) if name == "BOGUS"));
    assert!(err.to_string().contains("BOGUS"));
}
