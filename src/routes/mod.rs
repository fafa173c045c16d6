use axum::extract::{FromRequest, Request};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;

use crate::app_state::AppState;
use crate::error::{ApiError, InputError};
use crate::models::Credentials;
use crate::services::analysis::AnalysisService;
use crate::services::repository::ProductRepository;

pub mod health;
pub mod identify;
pub mod products;
pub mod tasks;

const API_KEY_HEADER: &str = "x-api-key";

/// API routes. `/metrics` is attached separately by the binary.
pub fn router<A: AnalysisService, R: ProductRepository>(state: AppState<A, R>) -> Router {
    Router::new()
        .route("/health", get(health::health_check::<A, R>))
        .route("/api/v1/identify", post(identify::start_identification::<A, R>))
        .route("/api/v1/activity", get(tasks::activity::<A, R>))
        .route("/api/v1/tasks", get(tasks::list_tasks::<A, R>))
        .route(
            "/api/v1/tasks/{task_id}",
            get(tasks::get_task::<A, R>).delete(tasks::dismiss_task::<A, R>),
        )
        .route(
            "/api/v1/tasks/{task_id}/feedback",
            post(tasks::submit_feedback::<A, R>),
        )
        .route("/api/v1/tasks/{task_id}/draft", get(tasks::get_draft::<A, R>))
        .route(
            "/api/v1/products",
            get(products::list_products::<A, R>).post(products::create_product::<A, R>),
        )
        .route(
            "/api/v1/products/{product_id}",
            get(products::get_product::<A, R>).delete(products::delete_product::<A, R>),
        )
        .route(
            "/api/v1/products/{product_id}/qc",
            post(products::start_qc::<A, R>),
        )
        .with_state(state)
}

/// The caller's key from `x-api-key`, else the configured default.
pub(crate) fn credentials<A, R>(
    headers: &HeaderMap,
    state: &AppState<A, R>,
) -> Result<Credentials, InputError> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(Credentials::new)
        .or_else(|| state.default_credentials.clone())
        .ok_or(InputError::MissingCredentials)
}

/// `Json` whose rejections use the API's error body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}
