use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::Product;
use crate::services::repository::{ProductRepository, RepositoryError};

/// Locally cached product list, refreshed from the repository after writes.
#[derive(Default)]
pub struct ProductCache {
    products: RwLock<Vec<Product>>,
}

impl ProductCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload from the repository. The cache is left as-is on error.
    pub async fn refresh<R: ProductRepository>(&self, repository: &R) -> Result<usize, RepositoryError> {
        let products = repository.list_products().await?;
        let count = products.len();
        *self.products.write().await = products;
        tracing::debug!(count, "Product cache refreshed");
        Ok(count)
    }

    pub async fn list(&self) -> Vec<Product> {
        self.products.read().await.clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<Product> {
        self.products.read().await.iter().find(|p| p.id == id).cloned()
    }
}
