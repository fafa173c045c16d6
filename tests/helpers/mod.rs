//! Shared test doubles and polling helpers
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

use product_qc::models::{
    AnalysisSettings, BackgroundTask, Credentials, ImageData, ImageId, Product, ProductProfile,
    QcReport, TaskId, TaskStatus,
};
use product_qc::services::analysis::{AnalysisError, AnalysisService};
use product_qc::services::repository::{InMemoryRepository, ProductRepository, RepositoryError};
use product_qc::services::storage::StorageError;
use product_qc::services::task_store::TaskStore;

/// What the mock model does when called.
#[derive(Clone)]
pub enum Behavior<T> {
    Succeed(T),
    QuotaExceeded,
    Panic,
}

/// Scriptable stand-in for the vision model.
///
/// With a gate, every call parks until the test releases a permit.
pub struct MockAnalysis {
    identify: Behavior<ProductProfile>,
    analyze: Behavior<QcReport>,
    gate: Option<Arc<Semaphore>>,
    responses: AtomicUsize,
    inspection_calls: Mutex<Vec<Vec<ImageData>>>,
    reference_calls: Mutex<Vec<Vec<ImageData>>>,
}

impl MockAnalysis {
    pub fn new(identify: Behavior<ProductProfile>, analyze: Behavior<QcReport>) -> Self {
        Self {
            identify,
            analyze,
            gate: None,
            responses: AtomicUsize::new(0),
            inspection_calls: Mutex::new(Vec::new()),
            reference_calls: Mutex::new(Vec::new()),
        }
    }

    /// Park calls until permits are added to the returned semaphore.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn responses(&self) -> usize {
        self.responses.load(Ordering::SeqCst)
    }

    /// Inspection image sets passed to `analyze`, one entry per call.
    pub fn inspection_calls(&self) -> Vec<Vec<ImageData>> {
        self.inspection_calls.lock().unwrap().clone()
    }

    pub fn reference_calls(&self) -> Vec<Vec<ImageData>> {
        self.reference_calls.lock().unwrap().clone()
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
    }

    fn respond<T: Clone>(&self, behavior: &Behavior<T>) -> Result<T, AnalysisError> {
        self.responses.fetch_add(1, Ordering::SeqCst);
        match behavior {
            Behavior::Succeed(value) => Ok(value.clone()),
            Behavior::QuotaExceeded => Err(AnalysisError::Quota("daily limit reached".to_string())),
            Behavior::Panic => panic!("model client blew up"),
        }
    }
}

impl AnalysisService for MockAnalysis {
    async fn identify(
        &self,
        _credentials: &Credentials,
        _images: &[ImageData],
        _url: Option<&str>,
        _settings: &AnalysisSettings,
    ) -> Result<ProductProfile, AnalysisError> {
        self.pass_gate().await;
        self.respond(&self.identify)
    }

    async fn analyze(
        &self,
        _credentials: &Credentials,
        _profile: &ProductProfile,
        reference_images: &[ImageData],
        inspection_images: &[ImageData],
        _settings: &AnalysisSettings,
    ) -> Result<QcReport, AnalysisError> {
        self.reference_calls
            .lock()
            .unwrap()
            .push(reference_images.to_vec());
        self.inspection_calls
            .lock()
            .unwrap()
            .push(inspection_images.to_vec());
        self.pass_gate().await;
        self.respond(&self.analyze)
    }
}

/// In-memory repository whose product writes and listing can be made to fail.
#[derive(Default)]
pub struct FlakyRepository {
    pub inner: InMemoryRepository,
    fail_saves: AtomicBool,
    fail_listing: AtomicBool,
}

impl FlakyRepository {
    pub fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }

    pub fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    fn unavailable() -> RepositoryError {
        RepositoryError::Storage(StorageError::Status(503))
    }
}

impl ProductRepository for FlakyRepository {
    async fn get_image(&self, id: ImageId) -> Result<Option<ImageData>, RepositoryError> {
        self.inner.get_image(id).await
    }

    async fn save_image(&self, id: ImageId, data: &ImageData) -> Result<(), RepositoryError> {
        self.inner.save_image(id, data).await
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepositoryError> {
        self.inner.get_product(id).await
    }

    async fn save_product(&self, product: &Product) -> Result<(), RepositoryError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.save_product(product).await
    }

    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.list_products().await
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool, RepositoryError> {
        self.inner.delete_product(id).await
    }

    async fn health_check(&self) -> Result<(), RepositoryError> {
        self.inner.health_check().await
    }
}

pub fn credentials() -> Credentials {
    Credentials::new("test-key")
}

/// Wait until the task reaches `status`, failing after five seconds.
pub async fn wait_for_status(store: &TaskStore, id: TaskId, status: TaskStatus) -> BackgroundTask {
    let mut rx = store.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let found = rx
                .borrow_and_update()
                .iter()
                .find(|t| t.id == id && t.status() == status)
                .cloned();
            if let Some(task) = found {
                return task;
            }
            rx.changed().await.expect("task store dropped");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("task {} never reached {}", id, status))
}

/// Wait until the mock has answered `count` calls, then let the runner settle.
pub async fn wait_for_responses(mock: &MockAnalysis, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while mock.responses() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("mock analysis was never called");
    tokio::time::sleep(Duration::from_millis(50)).await;
}
