//! In-memory repository for command-layer tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::task::{
    domain::{EventId, Task, TaskEvent, TaskEventRecord, TaskId, TaskState},
    ports::{EventRepository, TaskRepository, TaskRepositoryError, TaskRepositoryResult},
};

/// Thread-safe in-memory task and event repository.
///
/// Mirrors the SQLite adapter's ordering, not-found and referential rules
/// so services behave identically against either.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    state: Arc<RwLock<InMemoryTaskState>>,
}

#[derive(Debug, Default)]
struct InMemoryTaskState {
    tasks: HashMap<TaskId, Task>,
    events: Vec<TaskEventRecord>,
    last_event_id: i64,
}

impl InMemoryTaskState {
    fn append(&mut self, event: &TaskEvent) -> TaskRepositoryResult<TaskEventRecord> {
        if !self.tasks.contains_key(&event.task_id()) {
            return Err(TaskRepositoryError::persistence(std::io::Error::other(
                format!("event references unknown task {}", event.task_id()),
            )));
        }
        self.last_event_id += 1;
        let record = TaskEventRecord::new(EventId::new(self.last_event_id), event.clone());
        self.events.push(record.clone());
        Ok(record)
    }

    fn tasks_in_state(&self, state: TaskState) -> impl Iterator<Item = &Task> {
        self.tasks.values().filter(move |task| task.state() == state)
    }
}

impl InMemoryTaskRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> TaskRepositoryResult<RwLockReadGuard<'_, InMemoryTaskState>> {
        self.state.read().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write(&self) -> TaskRepositoryResult<RwLockWriteGuard<'_, InMemoryTaskState>> {
        self.state.write().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn create_task(&self, task: &Task) -> TaskRepositoryResult<()> {
        let mut state = self.write()?;
        if state.tasks.contains_key(&task.id()) {
            return Err(TaskRepositoryError::DuplicateTask(task.id()));
        }
        state.tasks.insert(task.id(), task.clone());
        if let Err(err) = state.append(&task.creation_event()) {
            state.tasks.remove(&task.id());
            return Err(err);
        }
        Ok(())
    }

    async fn get_task_by_id(&self, id: TaskId) -> TaskRepositoryResult<Task> {
        self.read()?
            .tasks
            .get(&id)
            .cloned()
            .ok_or(TaskRepositoryError::NotFound(id))
    }

    async fn get_active_task(&self) -> TaskRepositoryResult<Option<Task>> {
        let state = self.read()?;
        let active = state
            .tasks_in_state(TaskState::Active)
            .min_by_key(|task| (task.created_at(), task.id().to_string()))
            .cloned();
        Ok(active)
    }

    async fn get_deferred_tasks(&self) -> TaskRepositoryResult<Vec<Task>> {
        let state = self.read()?;
        let mut deferred: Vec<Task> = state.tasks_in_state(TaskState::Deferred).cloned().collect();
        deferred.sort_by_key(|task| (task.deferred_at(), task.id().to_string()));
        Ok(deferred)
    }

    async fn update_task(&self, task: &Task) -> TaskRepositoryResult<()> {
        let mut state = self.write()?;
        let stored = state
            .tasks
            .get_mut(&task.id())
            .ok_or(TaskRepositoryError::NotFound(task.id()))?;
        *stored = task.clone();
        Ok(())
    }

    async fn update_task_with_event(
        &self,
        task: &Task,
        event: &TaskEvent,
    ) -> TaskRepositoryResult<TaskEventRecord> {
        let mut state = self.write()?;
        let Some(previous) = state.tasks.get(&task.id()).cloned() else {
            return Err(TaskRepositoryError::NotFound(task.id()));
        };
        state.tasks.insert(task.id(), task.clone());
        match state.append(event) {
            Ok(record) => Ok(record),
            Err(err) => {
                state.tasks.insert(task.id(), previous);
                Err(err)
            }
        }
    }
}

#[async_trait]
impl EventRepository for InMemoryTaskRepository {
    async fn create_event(&self, event: &TaskEvent) -> TaskRepositoryResult<TaskEventRecord> {
        self.write()?.append(event)
    }

    async fn get_events_for_task(&self, id: TaskId) -> TaskRepositoryResult<Vec<TaskEventRecord>> {
        let state = self.read()?;
        let mut events: Vec<TaskEventRecord> = state
            .events
            .iter()
            .filter(|record| record.event().task_id() == id)
            .cloned()
            .collect();
        events.sort_by_key(|record| (record.event().timestamp(), record.id()));
        Ok(events)
    }
}
