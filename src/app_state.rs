use std::sync::Arc;

use crate::models::Credentials;
use crate::services::{
    analysis::{AnalysisService, GeminiClient},
    catalog::ProductCache,
    repository::{ProductRepository, Repository},
    runner::TaskRunner,
    task_store::TaskStore,
};

/// Shared application state passed to all route handlers.
pub struct AppState<A = GeminiClient, R = Repository> {
    pub runner: Arc<TaskRunner<A, R>>,
    pub default_credentials: Option<Credentials>,
}

// Not derived: that would demand `A: Clone` and `R: Clone`.
impl<A, R> Clone for AppState<A, R> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            default_credentials: self.default_credentials.clone(),
        }
    }
}

impl<A: AnalysisService, R: ProductRepository> AppState<A, R> {
    pub fn new(analysis: A, repository: R, default_credentials: Option<Credentials>) -> Self {
        let runner = TaskRunner::new(
            TaskStore::new(),
            Arc::new(analysis),
            Arc::new(repository),
            Arc::new(ProductCache::new()),
        );
        Self {
            runner: Arc::new(runner),
            default_credentials,
        }
    }

    pub fn store(&self) -> &TaskStore {
        self.runner.store()
    }

    pub fn repository(&self) -> &R {
        self.runner.repository()
    }

    pub fn catalog(&self) -> &ProductCache {
        self.runner.catalog()
    }
}
