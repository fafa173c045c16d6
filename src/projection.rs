//! Read-only views over the task list for the activity panel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    BackgroundTask, ImageData, ProductProfile, TaskError, TaskId, TaskKind, TaskOutput, TaskState,
    TaskStatus,
};

/// Where tapping an activity entry should take the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NavAction {
    /// Product-creation view, prefilled from the identification result.
    CreateProduct { task_id: TaskId },
    ReviewIdentification { task_id: TaskId },
    OpenProduct { product_id: Uuid },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<NavAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityFeed {
    /// Badge count: tasks still running.
    pub active_count: usize,
    pub entries: Vec<ActivityEntry>,
}

/// Form state for creating a product from an identification task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub task_id: TaskId,
    pub profile: ProductProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub images: Vec<ImageData>,
}

pub fn nav_action(task: &BackgroundTask) -> Option<NavAction> {
    match (&task.kind, &task.state) {
        (TaskKind::Identify, TaskState::Completed { .. }) => {
            Some(NavAction::CreateProduct { task_id: task.id })
        }
        (TaskKind::Identify, TaskState::AwaitingFeedback { .. }) => {
            Some(NavAction::ReviewIdentification { task_id: task.id })
        }
        (TaskKind::Qc, TaskState::Completed { .. }) => task
            .meta
            .product_id
            .map(|product_id| NavAction::OpenProduct { product_id }),
        _ => None,
    }
}

pub fn project(tasks: &[BackgroundTask]) -> ActivityFeed {
    let entries = tasks
        .iter()
        .map(|task| ActivityEntry {
            id: task.id,
            kind: task.kind,
            status: task.status(),
            title: task.meta.title.clone(),
            subtitle: task.meta.subtitle.clone(),
            created_at: task.created_at,
            error: match &task.state {
                TaskState::Failed { error } => Some(error.clone()),
                _ => None,
            },
            action: nav_action(task),
        })
        .collect();

    ActivityFeed {
        active_count: tasks
            .iter()
            .filter(|t| t.status() == TaskStatus::Processing)
            .count(),
        entries,
    }
}

/// Rebuild the product-creation form from an identification task.
pub fn draft_from_task(task: &BackgroundTask) -> Option<ProductDraft> {
    if task.kind != TaskKind::Identify {
        return None;
    }
    let profile = match &task.state {
        TaskState::Completed {
            output: TaskOutput::Profile(profile),
        } => profile.clone(),
        TaskState::AwaitingFeedback { draft } => draft.clone(),
        _ => return None,
    };

    Some(ProductDraft {
        task_id: task.id,
        profile,
        source_url: task.meta.source_url.clone(),
        images: task.meta.input_images.clone(),
    })
}
