use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::error::{ApiError, InputError};
use crate::models::api::{IdentifyRequest, TaskAccepted};
use crate::services::analysis::AnalysisService;
use crate::services::repository::ProductRepository;

use super::{credentials, ApiJson};

/// POST /api/v1/identify: start identifying a product in the background.
pub async fn start_identification<A: AnalysisService, R: ProductRepository>(
    State(state): State<AppState<A, R>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<IdentifyRequest>,
) -> Result<(StatusCode, Json<TaskAccepted>), ApiError> {
    let credentials = credentials(&headers, &state)?;
    request
        .validate()
        .map_err(|e| InputError::InvalidRequest(e.to_string()))?;

    let task_id = state.runner.start_identification(
        credentials,
        request.images,
        request.url,
        request.settings,
    )?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskAccepted {
            task_id,
            status: "processing".to_string(),
            message: "Identification started".to_string(),
        }),
    ))
}
