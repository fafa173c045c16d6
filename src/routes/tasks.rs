use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::api::FeedbackRequest;
use crate::models::{BackgroundTask, ProductProfile, TaskId};
use crate::projection::{self, ActivityFeed, ProductDraft};
use crate::services::analysis::AnalysisService;
use crate::services::repository::ProductRepository;

use super::ApiJson;

/// GET /api/v1/activity: the activity panel projection.
pub async fn activity<A: AnalysisService, R: ProductRepository>(
    State(state): State<AppState<A, R>>,
) -> Json<ActivityFeed> {
    Json(projection::project(&state.store().list()))
}

/// GET /api/v1/tasks: every tracked task, image payloads stripped.
pub async fn list_tasks<A: AnalysisService, R: ProductRepository>(
    State(state): State<AppState<A, R>>,
) -> Json<Vec<BackgroundTask>> {
    let tasks = state.store().list().iter().map(BackgroundTask::summary).collect();
    Json(tasks)
}

/// GET /api/v1/tasks/{task_id}
pub async fn get_task<A: AnalysisService, R: ProductRepository>(
    State(state): State<AppState<A, R>>,
    Path(task_id): Path<TaskId>,
) -> Result<Json<BackgroundTask>, ApiError> {
    state
        .store()
        .get(task_id)
        .map(Json)
        .ok_or(ApiError::NotFound("Task"))
}

/// DELETE /api/v1/tasks/{task_id}: dismiss; idempotent.
pub async fn dismiss_task<A: AnalysisService, R: ProductRepository>(
    State(state): State<AppState<A, R>>,
    Path(task_id): Path<TaskId>,
) -> StatusCode {
    state.runner.dismiss(task_id);
    StatusCode::NO_CONTENT
}

/// POST /api/v1/tasks/{task_id}/feedback: confirm an identification.
pub async fn submit_feedback<A: AnalysisService, R: ProductRepository>(
    State(state): State<AppState<A, R>>,
    Path(task_id): Path<TaskId>,
    ApiJson(request): ApiJson<FeedbackRequest>,
) -> Result<Json<ProductProfile>, ApiError> {
    let profile = state
        .runner
        .confirm_identification(task_id, request.profile)?;
    Ok(Json(profile))
}

/// GET /api/v1/tasks/{task_id}/draft: hydrate the product-creation form.
pub async fn get_draft<A: AnalysisService, R: ProductRepository>(
    State(state): State<AppState<A, R>>,
    Path(task_id): Path<TaskId>,
) -> Result<Json<ProductDraft>, ApiError> {
    state
        .store()
        .get(task_id)
        .as_ref()
        .and_then(projection::draft_from_task)
        .map(Json)
        .ok_or(ApiError::NotFound("Identification result"))
}
