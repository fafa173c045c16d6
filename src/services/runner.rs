//! Detached execution of identification and QC analysis tasks.
//!
//! Every start call validates input synchronously, appends a PROCESSING task,
//! and returns its id. The work itself runs on a detached tokio task whose
//! outcome becomes exactly one store update. Errors and panics never escape
//! to the caller.

use chrono::Utc;
use garde::Validate;
use reqwest::Url;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::error::{FeedbackError, InputError, StartError};
use crate::models::{
    AnalysisSettings, BackgroundTask, Credentials, FailureKind, ImageData, ImageId, Product,
    ProductProfile, QcBatch, QcReport, TaskError, TaskId, TaskKind, TaskMeta, TaskOutput,
    TaskState, TaskUpdate,
};
use crate::services::analysis::AnalysisService;
use crate::services::catalog::ProductCache;
use crate::services::repository::{ProductRepository, RepositoryError};
use crate::services::task_store::TaskStore;

pub struct TaskRunner<A, R> {
    store: TaskStore,
    analysis: Arc<A>,
    repository: Arc<R>,
    catalog: Arc<ProductCache>,
    qc_locks: Arc<ProductLocks>,
}

impl<A: AnalysisService, R: ProductRepository> TaskRunner<A, R> {
    pub fn new(
        store: TaskStore,
        analysis: Arc<A>,
        repository: Arc<R>,
        catalog: Arc<ProductCache>,
    ) -> Self {
        Self {
            store,
            analysis,
            repository,
            catalog,
            qc_locks: Arc::new(ProductLocks::default()),
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn catalog(&self) -> &Arc<ProductCache> {
        &self.catalog
    }

    /// Start identifying a product from images and/or a product page URL.
    pub fn start_identification(
        &self,
        credentials: Credentials,
        images: Vec<ImageData>,
        url: Option<String>,
        settings: AnalysisSettings,
    ) -> Result<TaskId, StartError> {
        let url = validate_url(url)?;
        if images.is_empty() && url.is_none() {
            return Err(InputError::NothingToIdentify.into());
        }
        validate_settings(&settings)?;

        let subtitle = match &url {
            Some(url) => url.clone(),
            None => format!("{} image(s)", images.len()),
        };
        let task = BackgroundTask::processing(
            TaskKind::Identify,
            TaskMeta {
                title: "Identify product".to_string(),
                subtitle: Some(subtitle),
                product_id: None,
                source_url: url.clone(),
                input_images: images.clone(),
                settings: Some(settings.clone()),
            },
        );

        let analysis = Arc::clone(&self.analysis);
        self.launch(task, async move {
            let profile = analysis
                .identify(&credentials, &images, url.as_deref(), &settings)
                .await
                .map_err(|e| TaskError::from(&e))?;

            if settings.confirm_identification {
                Ok(TaskUpdate::AwaitFeedback(profile))
            } else {
                Ok(TaskUpdate::Complete(TaskOutput::Profile(profile)))
            }
        })
    }

    /// Start a cumulative QC analysis of `product`.
    ///
    /// Runs on the same product execute one at a time, each against the
    /// latest stored history.
    pub fn start_qc(
        &self,
        credentials: Credentials,
        product: Product,
        reference_images: Vec<ImageData>,
        new_images: Vec<ImageData>,
        settings: AnalysisSettings,
    ) -> Result<TaskId, StartError> {
        if new_images.is_empty() {
            return Err(InputError::NoInspectionImages.into());
        }
        validate_settings(&settings)?;

        let task = BackgroundTask::processing(
            TaskKind::Qc,
            TaskMeta {
                title: format!("QC: {}", product.profile.name),
                subtitle: Some(format!("{} new image(s)", new_images.len())),
                product_id: Some(product.id),
                ..Default::default()
            },
        );

        let run = QcRun {
            analysis: Arc::clone(&self.analysis),
            repository: Arc::clone(&self.repository),
            catalog: Arc::clone(&self.catalog),
            locks: Arc::clone(&self.qc_locks),
            credentials,
            settings,
        };
        let product_id = product.id;
        self.launch(task, async move {
            let report = run.execute(product_id, reference_images, new_images).await?;
            Ok(TaskUpdate::Complete(TaskOutput::Report(report)))
        })
    }

    /// Forget a task. In-flight work keeps running; its result is dropped.
    pub fn dismiss(&self, id: TaskId) -> bool {
        let removed = self.store.remove(id);
        if removed {
            tracing::debug!(task_id = %id, "Task dismissed");
            metrics::gauge!("qc_tasks_active").set(self.store.active_count() as f64);
        }
        removed
    }

    /// Complete an identification that is awaiting user confirmation.
    ///
    /// `profile` replaces the model's draft when given.
    pub fn confirm_identification(
        &self,
        id: TaskId,
        profile: Option<ProductProfile>,
    ) -> Result<ProductProfile, FeedbackError> {
        let task = self.store.get(id).ok_or(FeedbackError::NotFound(id))?;
        let draft = match task.state {
            TaskState::AwaitingFeedback { draft } => draft,
            _ => return Err(FeedbackError::NotAwaitingFeedback(id)),
        };

        let profile = profile.unwrap_or(draft);
        profile
            .validate()
            .map_err(|e| FeedbackError::InvalidProfile(e.to_string()))?;

        let update = TaskUpdate::Complete(TaskOutput::Profile(profile.clone()));
        if !self.store.update(id, update) {
            // Dismissed or settled between the read and the write.
            return Err(FeedbackError::NotAwaitingFeedback(id));
        }

        tracing::info!(task_id = %id, name = %profile.name, "Identification confirmed");
        Ok(profile)
    }

    /// Append the task and run `work` detached from the caller.
    fn launch<F>(&self, task: BackgroundTask, work: F) -> Result<TaskId, StartError>
    where
        F: Future<Output = Result<TaskUpdate, TaskError>> + Send + 'static,
    {
        let id = task.id;
        let kind = task.kind;
        self.store.append(task)?;

        metrics::counter!("qc_tasks_started_total", "kind" => kind.to_string()).increment(1);
        metrics::gauge!("qc_tasks_active").set(self.store.active_count() as f64);
        tracing::info!(task_id = %id, kind = %kind, "Background task started");

        let store = self.store.clone();
        tokio::spawn(async move {
            let started = Instant::now();

            // Run in a nested task so a panic still resolves the record.
            let update = match tokio::spawn(work).await {
                Ok(Ok(update)) => update,
                Ok(Err(error)) => TaskUpdate::Fail(error),
                Err(join_error) => TaskUpdate::Fail(TaskError::new(
                    FailureKind::Internal,
                    format!("Task aborted unexpectedly: {}", join_error),
                )),
            };

            let elapsed = started.elapsed();
            metrics::histogram!("qc_task_duration_seconds", "kind" => kind.to_string())
                .record(elapsed.as_secs_f64());

            match &update {
                TaskUpdate::Fail(error) => {
                    metrics::counter!(
                        "qc_tasks_failed_total",
                        "kind" => kind.to_string(),
                        "reason" => error.kind.to_string()
                    )
                    .increment(1);
                    tracing::warn!(
                        task_id = %id,
                        kind = %kind,
                        reason = %error.kind,
                        error = %error.message,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Background task failed"
                    );
                }
                TaskUpdate::Complete(_) | TaskUpdate::AwaitFeedback(_) => {
                    metrics::counter!("qc_tasks_completed_total", "kind" => kind.to_string())
                        .increment(1);
                    tracing::info!(
                        task_id = %id,
                        kind = %kind,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Background task finished"
                    );
                }
            }

            store.update(id, update);
            metrics::gauge!("qc_tasks_active").set(store.active_count() as f64);
        });

        Ok(id)
    }
}

/// Everything one QC run needs, moved into the detached task.
struct QcRun<A, R> {
    analysis: Arc<A>,
    repository: Arc<R>,
    catalog: Arc<ProductCache>,
    locks: Arc<ProductLocks>,
    credentials: Credentials,
    settings: AnalysisSettings,
}

impl<A: AnalysisService, R: ProductRepository> QcRun<A, R> {
    /// Steps run strictly in order. Nothing is persisted until analysis succeeds.
    async fn execute(
        self,
        product_id: Uuid,
        reference_images: Vec<ImageData>,
        new_images: Vec<ImageData>,
    ) -> Result<QcReport, TaskError> {
        let storage_err = |e: RepositoryError| TaskError::from(&e);

        let _guard = self.locks.acquire(product_id).await;
        let mut product = self
            .repository
            .get_product(product_id)
            .await
            .map_err(storage_err)?
            .ok_or_else(|| {
                TaskError::new(
                    FailureKind::Storage,
                    format!("Product {} no longer exists", product_id),
                )
            })?;

        let mut all_images = self.load_history(&product).await;
        let history_len = all_images.len();
        all_images.extend(new_images.iter().cloned());

        tracing::debug!(
            product_id = %product.id,
            history = history_len,
            new = new_images.len(),
            references = reference_images.len(),
            "Submitting cumulative QC analysis"
        );

        let report = self
            .analysis
            .analyze(
                &self.credentials,
                &product.profile,
                &reference_images,
                &all_images,
                &self.settings,
            )
            .await
            .map_err(|e| TaskError::from(&e))?;

        let mut image_ids = Vec::with_capacity(new_images.len());
        for image in &new_images {
            let id = ImageId::new();
            self.repository
                .save_image(id, image)
                .await
                .map_err(storage_err)?;
            image_ids.push(id);
        }

        let batch = QcBatch {
            id: Uuid::new_v4(),
            image_ids,
            created_at: Utc::now(),
        };
        product.record_qc(batch, report.clone());
        self.repository
            .save_product(&product)
            .await
            .map_err(storage_err)?;

        self.catalog
            .refresh(self.repository.as_ref())
            .await
            .map_err(storage_err)?;

        tracing::info!(
            product_id = %product.id,
            score = report.overall_score,
            verdict = %report.verdict,
            batches = product.qc_batches.len(),
            "QC report recorded"
        );

        Ok(report)
    }

    /// Every earlier inspection image, in batch order. Unresolvable ids are skipped.
    async fn load_history(&self, product: &Product) -> Vec<ImageData> {
        let mut images = Vec::new();
        for id in product.inspection_history() {
            match self.repository.get_image(*id).await {
                Ok(Some(image)) => images.push(image),
                Ok(None) => {
                    tracing::warn!(product_id = %product.id, image_id = %id, "Historical image missing, skipping");
                }
                Err(e) => {
                    tracing::warn!(product_id = %product.id, image_id = %id, error = %e, "Historical image unreadable, skipping");
                }
            }
        }
        images
    }
}

/// One async lock per product id. Idle entries are pruned on the next acquire.
#[derive(Default)]
struct ProductLocks {
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl ProductLocks {
    async fn acquire(&self, product_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Held or awaited locks have clones outside the map.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(product_id).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn validate_url(url: Option<String>) -> Result<Option<String>, InputError> {
    let Some(raw) = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) else {
        return Ok(None);
    };

    let parsed = Url::parse(&raw).map_err(|e| InputError::InvalidUrl(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(Some(parsed.to_string())),
        other => Err(InputError::InvalidUrl(format!("unsupported scheme '{}'", other))),
    }
}

fn validate_settings(settings: &AnalysisSettings) -> Result<(), InputError> {
    settings
        .validate()
        .map_err(|e| InputError::InvalidSettings(e.to_string()))
}
