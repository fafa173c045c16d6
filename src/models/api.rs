use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::image::ImageData;
use super::product::ProductProfile;
use super::settings::AnalysisSettings;
use super::task::TaskId;

/// POST /api/v1/identify
#[derive(Debug, Deserialize, Validate)]
pub struct IdentifyRequest {
    #[garde(skip)]
    #[serde(default)]
    pub images: Vec<ImageData>,

    #[garde(length(min = 1, max = 2048))]
    #[serde(default)]
    pub url: Option<String>,

    #[garde(dive)]
    #[serde(default)]
    pub settings: AnalysisSettings,
}

/// POST /api/v1/products/{id}/qc
#[derive(Debug, Deserialize, Validate)]
pub struct QcRequest {
    #[garde(length(min = 1))]
    pub images: Vec<ImageData>,

    #[garde(dive)]
    #[serde(default)]
    pub settings: AnalysisSettings,
}

/// POST /api/v1/tasks/{id}/feedback
#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    #[serde(default)]
    pub profile: Option<ProductProfile>,
}

/// POST /api/v1/products
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[garde(dive)]
    pub profile: ProductProfile,

    #[garde(skip)]
    #[serde(default)]
    pub reference_images: Vec<ImageData>,
}

/// Response after starting a background task.
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskAccepted {
    pub task_id: TaskId,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
