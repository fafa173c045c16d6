use tokio::sync::watch;

use crate::error::StoreError;
use crate::models::{BackgroundTask, TaskId, TaskStatus, TaskUpdate};

/// Process-wide, most-recent-first list of background tasks.
///
/// The list lives inside a watch channel: every operation runs in a single
/// `send_modify`/`send_if_modified` section and wakes subscribers only when
/// something changed.
#[derive(Clone)]
pub struct TaskStore {
    tx: watch::Sender<Vec<BackgroundTask>>,
}

impl TaskStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { tx }
    }

    /// Insert a task at the front. Ids must be unique.
    pub fn append(&self, task: BackgroundTask) -> Result<(), StoreError> {
        let id = task.id;
        let mut task = Some(task);
        self.tx.send_if_modified(|tasks| {
            if tasks.iter().any(|t| t.id == id) {
                return false;
            }
            if let Some(task) = task.take() {
                tasks.insert(0, task);
            }
            true
        });

        match task {
            Some(_) => Err(StoreError::DuplicateId(id)),
            None => Ok(()),
        }
    }

    /// Apply a transition to the task with this id.
    ///
    /// Missing ids and backward transitions are silently ignored; a task
    /// dismissed while its work is in flight ends up here.
    pub fn update(&self, id: TaskId, update: TaskUpdate) -> bool {
        let applied = self.tx.send_if_modified(|tasks| {
            tasks
                .iter_mut()
                .find(|t| t.id == id)
                .is_some_and(|t| t.apply(update))
        });
        if !applied {
            tracing::trace!(task_id = %id, "Dropped update for absent or settled task");
        }
        applied
    }

    /// Remove a task. Idempotent.
    pub fn remove(&self, id: TaskId) -> bool {
        self.tx.send_if_modified(|tasks| {
            let before = tasks.len();
            tasks.retain(|t| t.id != id);
            tasks.len() != before
        })
    }

    pub fn list(&self) -> Vec<BackgroundTask> {
        self.tx.borrow().clone()
    }

    pub fn get(&self, id: TaskId) -> Option<BackgroundTask> {
        self.tx.borrow().iter().find(|t| t.id == id).cloned()
    }

    /// Tasks still processing.
    pub fn active_count(&self) -> usize {
        self.tx
            .borrow()
            .iter()
            .filter(|t| t.status() == TaskStatus::Processing)
            .count()
    }

    /// Observe the list. The receiver is woken after every effective mutation.
    pub fn subscribe(&self) -> watch::Receiver<Vec<BackgroundTask>> {
        self.tx.subscribe()
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}
