use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::{ImageData, ImageId, Product};
use crate::services::repository::{ProductRepository, RepositoryError};
use crate::services::storage::ImageStore;

pub mod queries;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Products in Postgres, image blobs in object storage.
pub struct PgRepository {
    pool: PgPool,
    images: ImageStore,
}

impl PgRepository {
    pub fn new(pool: PgPool, images: ImageStore) -> Self {
        Self { pool, images }
    }
}

impl ProductRepository for PgRepository {
    async fn get_image(&self, id: ImageId) -> Result<Option<ImageData>, RepositoryError> {
        match self.images.download(&id.storage_key()).await? {
            Some(bytes) => ImageData::from_bytes(bytes)
                .map(Some)
                .map_err(|_| RepositoryError::CorruptImage(id)),
            None => Ok(None),
        }
    }

    async fn save_image(&self, id: ImageId, data: &ImageData) -> Result<(), RepositoryError> {
        self.images
            .upload(&id.storage_key(), data.bytes(), data.mime())
            .await?;
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepositoryError> {
        Ok(queries::get_product(&self.pool, id).await?)
    }

    async fn save_product(&self, product: &Product) -> Result<(), RepositoryError> {
        queries::upsert_product(&self.pool, product).await?;
        Ok(())
    }

    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        Ok(queries::list_products(&self.pool).await?)
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let Some(product) = queries::delete_product(&self.pool, id).await? else {
            return Ok(false);
        };

        // Blob cleanup is best-effort once the row is gone.
        for image_id in product.image_ids() {
            if let Err(e) = self.images.delete(&image_id.storage_key()).await {
                tracing::warn!(product_id = %id, image_id = %image_id, error = %e, "Failed to delete image blob");
            }
        }
        Ok(true)
    }

    async fn health_check(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
