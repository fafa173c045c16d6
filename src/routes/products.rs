use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::{ApiError, InputError};
use crate::models::api::{CreateProductRequest, ProductCreated, QcRequest, TaskAccepted};
use crate::models::{ImageData, ImageId, Product};
use crate::services::analysis::AnalysisService;
use crate::services::repository::ProductRepository;

use super::{credentials, ApiJson};

/// GET /api/v1/products: the cached product list.
pub async fn list_products<A: AnalysisService, R: ProductRepository>(
    State(state): State<AppState<A, R>>,
) -> Json<Vec<Product>> {
    Json(state.catalog().list().await)
}

/// GET /api/v1/products/{product_id}
pub async fn get_product<A: AnalysisService, R: ProductRepository>(
    State(state): State<AppState<A, R>>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Product>, ApiError> {
    state
        .repository()
        .get_product(product_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Product"))
}

/// POST /api/v1/products: create a product from a (confirmed) profile.
pub async fn create_product<A: AnalysisService, R: ProductRepository>(
    State(state): State<AppState<A, R>>,
    ApiJson(request): ApiJson<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductCreated>), ApiError> {
    request
        .validate()
        .map_err(|e| InputError::InvalidRequest(e.to_string()))?;

    let repository = state.repository();
    let mut reference_ids = Vec::with_capacity(request.reference_images.len());
    for image in &request.reference_images {
        let id = ImageId::new();
        repository.save_image(id, image).await?;
        reference_ids.push(id);
    }

    let product = Product::new(request.profile, reference_ids);
    repository.save_product(&product).await?;
    state.catalog().refresh(repository).await?;

    tracing::info!(
        product_id = %product.id,
        name = %product.profile.name,
        references = product.reference_image_ids.len(),
        "Product created"
    );

    Ok((
        StatusCode::CREATED,
        Json(ProductCreated {
            product_id: product.id,
        }),
    ))
}

/// DELETE /api/v1/products/{product_id}
pub async fn delete_product<A: AnalysisService, R: ProductRepository>(
    State(state): State<AppState<A, R>>,
    Path(product_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !state.repository().delete_product(product_id).await? {
        return Err(ApiError::NotFound("Product"));
    }
    state.catalog().refresh(state.repository()).await?;
    tracing::info!(product_id = %product_id, "Product deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/products/{product_id}/qc: start a cumulative QC analysis.
pub async fn start_qc<A: AnalysisService, R: ProductRepository>(
    State(state): State<AppState<A, R>>,
    Path(product_id): Path<Uuid>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<QcRequest>,
) -> Result<(StatusCode, Json<TaskAccepted>), ApiError> {
    let credentials = credentials(&headers, &state)?;
    request
        .validate()
        .map_err(|e| InputError::InvalidRequest(e.to_string()))?;

    let product = state
        .repository()
        .get_product(product_id)
        .await?
        .ok_or(ApiError::NotFound("Product"))?;

    let reference_images = load_references(state.repository(), &product).await?;

    let task_id = state.runner.start_qc(
        credentials,
        product,
        reference_images,
        request.images,
        request.settings,
    )?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskAccepted {
            task_id,
            status: "processing".to_string(),
            message: "QC analysis started".to_string(),
        }),
    ))
}

/// Reference images for a product; missing blobs are skipped.
async fn load_references<R: ProductRepository>(
    repository: &R,
    product: &Product,
) -> Result<Vec<ImageData>, ApiError> {
    let mut images = Vec::with_capacity(product.reference_image_ids.len());
    for id in &product.reference_image_ids {
        match repository.get_image(*id).await? {
            Some(image) => images.push(image),
            None => {
                tracing::warn!(product_id = %product.id, image_id = %id, "Reference image missing, skipping");
            }
        }
    }
    Ok(images)
}
