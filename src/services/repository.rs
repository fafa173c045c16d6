use std::collections::HashMap;
use std::future::Future;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::PgRepository;
use crate::models::{FailureKind, ImageData, ImageId, Product, TaskError};
use crate::services::storage::StorageError;

/// Durable storage for products and their image blobs.
pub trait ProductRepository: Send + Sync + 'static {
    fn get_image(
        &self,
        id: ImageId,
    ) -> impl Future<Output = Result<Option<ImageData>, RepositoryError>> + Send;

    fn save_image(
        &self,
        id: ImageId,
        data: &ImageData,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn get_product(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Product>, RepositoryError>> + Send;

    /// Insert or replace a product.
    fn save_product(
        &self,
        product: &Product,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// All products, newest first.
    fn list_products(&self) -> impl Future<Output = Result<Vec<Product>, RepositoryError>> + Send;

    /// Delete a product together with its reference and inspection images.
    fn delete_product(&self, id: Uuid)
        -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    fn health_check(&self) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// In-process fallback used when no database is configured. Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryRepository {
    products: RwLock<HashMap<Uuid, Product>>,
    images: RwLock<HashMap<ImageId, ImageData>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn image_count(&self) -> usize {
        self.images.read().await.len()
    }
}

impl ProductRepository for InMemoryRepository {
    async fn get_image(&self, id: ImageId) -> Result<Option<ImageData>, RepositoryError> {
        Ok(self.images.read().await.get(&id).cloned())
    }

    async fn save_image(&self, id: ImageId, data: &ImageData) -> Result<(), RepositoryError> {
        self.images.write().await.insert(id, data.clone());
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepositoryError> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn save_product(&self, product: &Product) -> Result<(), RepositoryError> {
        self.products
            .write()
            .await
            .insert(product.id, product.clone());
        Ok(())
    }

    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let mut products: Vec<Product> = self.products.read().await.values().cloned().collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products)
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let Some(product) = self.products.write().await.remove(&id) else {
            return Ok(false);
        };
        let mut images = self.images.write().await;
        for image_id in product.image_ids() {
            images.remove(&image_id);
        }
        Ok(true)
    }

    async fn health_check(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// The backend selected at startup.
pub enum Repository {
    Postgres(PgRepository),
    Memory(InMemoryRepository),
}

impl Repository {
    pub fn backend_name(&self) -> &'static str {
        match self {
            Repository::Postgres(_) => "postgres",
            Repository::Memory(_) => "memory",
        }
    }
}

impl ProductRepository for Repository {
    async fn get_image(&self, id: ImageId) -> Result<Option<ImageData>, RepositoryError> {
        match self {
            Repository::Postgres(r) => r.get_image(id).await,
            Repository::Memory(r) => r.get_image(id).await,
        }
    }

    async fn save_image(&self, id: ImageId, data: &ImageData) -> Result<(), RepositoryError> {
        match self {
            Repository::Postgres(r) => r.save_image(id, data).await,
            Repository::Memory(r) => r.save_image(id, data).await,
        }
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepositoryError> {
        match self {
            Repository::Postgres(r) => r.get_product(id).await,
            Repository::Memory(r) => r.get_product(id).await,
        }
    }

    async fn save_product(&self, product: &Product) -> Result<(), RepositoryError> {
        match self {
            Repository::Postgres(r) => r.save_product(product).await,
            Repository::Memory(r) => r.save_product(product).await,
        }
    }

    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        match self {
            Repository::Postgres(r) => r.list_products().await,
            Repository::Memory(r) => r.list_products().await,
        }
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool, RepositoryError> {
        match self {
            Repository::Postgres(r) => r.delete_product(id).await,
            Repository::Memory(r) => r.delete_product(id).await,
        }
    }

    async fn health_check(&self) -> Result<(), RepositoryError> {
        match self {
            Repository::Postgres(r) => r.health_check().await,
            Repository::Memory(r) => r.health_check().await,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Image storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Stored image {0} is not a recognized image")]
    CorruptImage(ImageId),
}

impl From<&RepositoryError> for TaskError {
    fn from(err: &RepositoryError) -> Self {
        TaskError::new(FailureKind::Storage, err.to_string())
    }
}
