use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{ImageId, Product, ProductProfile, QcBatch, QcReport};

const PRODUCT_COLUMNS: &str =
    "id, profile, reference_image_ids, qc_batches, reports, created_at, updated_at";

fn product_from_row(row: &PgRow) -> Result<Product, sqlx::Error> {
    let profile: Json<ProductProfile> = row.try_get("profile")?;
    let reference_image_ids: Json<Vec<ImageId>> = row.try_get("reference_image_ids")?;
    let qc_batches: Json<Vec<QcBatch>> = row.try_get("qc_batches")?;
    let reports: Json<Vec<QcReport>> = row.try_get("reports")?;

    Ok(Product {
        id: row.try_get("id")?,
        profile: profile.0,
        reference_image_ids: reference_image_ids.0,
        qc_batches: qc_batches.0,
        reports: reports.0,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a product, or replace every mutable column if it exists.
pub async fn upsert_product(pool: &PgPool, product: &Product) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO products (id, profile, reference_image_ids, qc_batches, reports, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO UPDATE
        SET profile = EXCLUDED.profile,
            reference_image_ids = EXCLUDED.reference_image_ids,
            qc_batches = EXCLUDED.qc_batches,
            reports = EXCLUDED.reports,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(product.id)
    .bind(Json(&product.profile))
    .bind(Json(&product.reference_image_ids))
    .bind(Json(&product.qc_batches))
    .bind(Json(&product.reports))
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a product by ID
pub async fn get_product(pool: &PgPool, product_id: Uuid) -> Result<Option<Product>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM products WHERE id = $1",
        PRODUCT_COLUMNS
    ))
    .bind(product_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(product_from_row).transpose()
}

/// All products, newest first
pub async fn list_products(pool: &PgPool) -> Result<Vec<Product>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM products ORDER BY created_at DESC",
        PRODUCT_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(product_from_row).collect()
}

/// Delete a product, returning it if it existed
pub async fn delete_product(pool: &PgPool, product_id: Uuid) -> Result<Option<Product>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "DELETE FROM products WHERE id = $1 RETURNING {}",
        PRODUCT_COLUMNS
    ))
    .bind(product_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(product_from_row).transpose()
}
