//! Notifications observed by a live monitor.

use crate::workflow::helpers::{Workflow, workflow};
use jot::ipc::{BoxError, IpcEvent, IpcServer};
use jot::task::services::{ActiveConflictPolicy, TaskSelector};
use rstest::rstest;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

type Seen = Arc<Mutex<Vec<(IpcEvent, String)>>>;

async fn wait_for(seen: &Seen, count: usize) -> Vec<(IpcEvent, String)> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let snapshot = seen.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if snapshot.len() >= count || tokio::time::Instant::now() >= deadline {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn monitor_receives_every_transition(workflow: Workflow) {
    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    let record = move |event: IpcEvent, task_id: &str| -> Result<(), BoxError> {
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((event, task_id.to_owned()));
        Ok(())
    };
    let mut monitor = IpcServer::new(workflow.paths.socket_path(), record);
    monitor.start().expect("start monitor");

    let first = workflow
        .service
        .add("Write docs", &ActiveConflictPolicy::Reject)
        .await
        .expect("add first");
    // Each notification uses its own connection, so only phases are ordered.
    wait_for(&seen, 1).await;
    let second = workflow
        .service
        .add("Fix outage", &ActiveConflictPolicy::Defer("interrupted".to_owned()))
        .await
        .expect("add second");
    wait_for(&seen, 3).await;
    workflow
        .service
        .resume(TaskSelector::Ordinal(1), &ActiveConflictPolicy::Complete)
        .await
        .expect("resume");

    let events = wait_for(&seen, 5).await;
    let (a, b) = (first.id().to_string(), second.id().to_string());
    assert_eq!(events.len(), 5, "received {events:?}");
    let phases = [
        vec![(IpcEvent::TaskCreated, a.clone())],
        vec![(IpcEvent::TaskDeferred, a.clone()), (IpcEvent::TaskCreated, b.clone())],
        vec![(IpcEvent::TaskCompleted, b), (IpcEvent::TaskResumed, a)],
    ];
    let mut rest = events.as_slice();
    for expected in phases {
        let (phase, tail) = rest.split_at(expected.len());
        for item in &expected {
            assert!(phase.contains(item), "missing {item:?} in {phase:?}");
        }
        rest = tail;
    }
    monitor.stop().await;
}
