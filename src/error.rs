use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::models::api::ErrorResponse;
use crate::models::TaskId;
use crate::services::repository::RepositoryError;

/// Problems with caller input, rejected before any task is created.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("Provide at least one image or a source URL")]
    NothingToIdentify,

    #[error("Provide at least one inspection image")]
    NoInspectionImages,

    #[error("Invalid source URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported image format")]
    UnsupportedImage,

    #[error("Malformed image payload: {0}")]
    MalformedImage(&'static str),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Missing model API key")]
    MissingCredentials,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl InputError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            InputError::MissingCredentials => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for InputError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Task {0} already exists")]
    DuplicateId(TaskId),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeedbackError {
    #[error("Task {0} not found")]
    NotFound(TaskId),

    #[error("Task {0} is not awaiting feedback")]
    NotAwaitingFeedback(TaskId),

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),
}

impl IntoResponse for FeedbackError {
    fn into_response(self) -> Response {
        let status = match self {
            FeedbackError::NotFound(_) => StatusCode::NOT_FOUND,
            FeedbackError::NotAwaitingFeedback(_) => StatusCode::CONFLICT,
            FeedbackError::InvalidProfile(_) => StatusCode::BAD_REQUEST,
        };
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Why a background task could not be started.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for StartError {
    fn into_response(self) -> Response {
        match self {
            StartError::Input(e) => e.into_response(),
            StartError::Store(e) => {
                let body = ErrorResponse {
                    error: e.to_string(),
                };
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

/// Everything a route handler can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Start(#[from] StartError),

    #[error(transparent)]
    Feedback(#[from] FeedbackError),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Body did not parse, including images rejected while decoding.
    #[error(transparent)]
    Body(#[from] JsonRejection),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Input(e) => e.into_response(),
            ApiError::Start(e) => e.into_response(),
            ApiError::Feedback(e) => e.into_response(),
            ApiError::NotFound(_) => {
                let body = ErrorResponse {
                    error: self.to_string(),
                };
                (StatusCode::NOT_FOUND, Json(body)).into_response()
            }
            ApiError::Body(rejection) => {
                let status = match &rejection {
                    JsonRejection::JsonDataError(_) | JsonRejection::JsonSyntaxError(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    other => other.status(),
                };
                let body = ErrorResponse {
                    error: rejection.body_text(),
                };
                (status, Json(body)).into_response()
            }
            ApiError::Repository(e) => {
                tracing::error!(error = %e, "Repository operation failed");
                let body = ErrorResponse {
                    error: "Storage backend unavailable".to_string(),
                };
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}
