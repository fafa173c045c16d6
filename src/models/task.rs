use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};
use uuid::Uuid;

use super::image::ImageData;
use super::product::{ProductProfile, QcReport};
use super::settings::AnalysisSettings;

/// Identifier of a background task. Fresh v4 UUIDs, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "snake_case")]
pub enum TaskKind {
    Identify,
    Qc,
}

/// Flat status label, derived from [`TaskState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Processing,
    AwaitingFeedback,
    Completed,
    Failed,
}

/// Category of a task failure, so consumers can branch without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// Model quota or rate limit exhausted.
    Quota,
    Network,
    /// The model answered, but not with something usable.
    Model,
    Storage,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TaskError {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutput {
    Profile(ProductProfile),
    Report(QcReport),
}

/// Lifecycle of a task. Result and error can never both be present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Processing,
    AwaitingFeedback { draft: ProductProfile },
    Completed { output: TaskOutput },
    Failed { error: TaskError },
}

impl TaskState {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskState::Processing => TaskStatus::Processing,
            TaskState::AwaitingFeedback { .. } => TaskStatus::AwaitingFeedback,
            TaskState::Completed { .. } => TaskStatus::Completed,
            TaskState::Failed { .. } => TaskStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed { .. } | TaskState::Failed { .. })
    }
}

/// A state transition applied through the task store.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskUpdate {
    Complete(TaskOutput),
    Fail(TaskError),
    AwaitFeedback(ProductProfile),
}

/// Display and resume context captured when the task is created.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskMeta {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_images: Vec<ImageData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<AnalysisSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundTask {
    pub id: TaskId,
    pub kind: TaskKind,
    #[serde(flatten)]
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub meta: TaskMeta,
}

impl BackgroundTask {
    pub fn processing(kind: TaskKind, meta: TaskMeta) -> Self {
        Self {
            id: TaskId::new(),
            kind,
            state: TaskState::Processing,
            created_at: Utc::now(),
            meta,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.state.status()
    }

    /// Apply a transition if it moves the task forward.
    ///
    /// Returns `false` and leaves the task untouched otherwise.
    pub fn apply(&mut self, update: TaskUpdate) -> bool {
        let next = match (&self.state, update) {
            (TaskState::Processing, TaskUpdate::AwaitFeedback(draft)) => {
                TaskState::AwaitingFeedback { draft }
            }
            (
                TaskState::Processing | TaskState::AwaitingFeedback { .. },
                TaskUpdate::Complete(output),
            ) => TaskState::Completed { output },
            (TaskState::Processing | TaskState::AwaitingFeedback { .. }, TaskUpdate::Fail(error)) => {
                TaskState::Failed { error }
            }
            _ => return false,
        };
        self.state = next;
        true
    }

    /// Copy with image payloads stripped, for list views.
    pub fn summary(&self) -> Self {
        let mut task = self.clone();
        task.meta.input_images.clear();
        task
    }
}
