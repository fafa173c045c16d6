mod fixtures;
mod helpers;

use std::collections::HashSet;
use std::sync::Arc;

use product_qc::error::{FeedbackError, InputError, StartError};
use product_qc::models::{
    AnalysisSettings, FailureKind, ImageId, Product, ProductProfile, QcBatch, TaskId, TaskKind,
    TaskOutput, TaskState, TaskStatus, Verdict,
};
use product_qc::services::catalog::ProductCache;
use product_qc::services::repository::{InMemoryRepository, ProductRepository};
use product_qc::services::runner::TaskRunner;
use product_qc::services::task_store::TaskStore;

use fixtures::{png, report, widget, widget_profile};
use helpers::{
    credentials, wait_for_responses, wait_for_status, Behavior, FlakyRepository, MockAnalysis,
};

struct Harness {
    runner: TaskRunner<MockAnalysis, InMemoryRepository>,
    mock: Arc<MockAnalysis>,
    repository: Arc<InMemoryRepository>,
}

impl Harness {
    fn new(mock: MockAnalysis) -> Self {
        let mock = Arc::new(mock);
        let repository = Arc::new(InMemoryRepository::new());
        let runner = TaskRunner::new(
            TaskStore::new(),
            Arc::clone(&mock),
            Arc::clone(&repository),
            Arc::new(ProductCache::new()),
        );
        Self {
            runner,
            mock,
            repository,
        }
    }

    fn store(&self) -> &TaskStore {
        self.runner.store()
    }

    fn start_qc(&self, product: Product, new_tags: &[u8]) -> TaskId {
        self.runner
            .start_qc(
                credentials(),
                product,
                vec![png(200)],
                new_tags.iter().map(|t| png(*t)).collect(),
                AnalysisSettings::default(),
            )
            .unwrap()
    }
}

fn succeeding() -> MockAnalysis {
    MockAnalysis::new(
        Behavior::Succeed(widget_profile()),
        Behavior::Succeed(report(92, Verdict::Pass)),
    )
}

/// Store a product whose history is two batches: [i1, i2] then [i3].
async fn product_with_history(repository: &InMemoryRepository) -> (Product, Vec<ImageId>) {
    let ids: Vec<ImageId> = (0..3).map(|_| ImageId::new()).collect();
    for (tag, id) in ids.iter().enumerate() {
        repository.save_image(*id, &png(tag as u8 + 1)).await.unwrap();
    }

    let mut product = widget();
    for image_ids in [vec![ids[0], ids[1]], vec![ids[2]]] {
        let batch = QcBatch {
            id: uuid::Uuid::new_v4(),
            image_ids,
            created_at: chrono::Utc::now(),
        };
        product.record_qc(batch, report(80, Verdict::Caution));
    }
    repository.save_product(&product).await.unwrap();
    (product, ids)
}

#[tokio::test]
async fn test_identification_completes_with_profile() {
    let (mock, gate) = succeeding().gated();
    let harness = Harness::new(mock);

    let id = harness
        .runner
        .start_identification(
            credentials(),
            vec![png(1)],
            None,
            AnalysisSettings::default(),
        )
        .unwrap();

    let task = harness.store().get(id).unwrap();
    assert_eq!(task.status(), TaskStatus::Processing);
    assert_eq!(task.kind, TaskKind::Identify);
    assert_eq!(task.meta.input_images, vec![png(1)]);
    assert_eq!(harness.store().active_count(), 1);

    gate.add_permits(1);
    let task = wait_for_status(harness.store(), id, TaskStatus::Completed).await;
    match task.state {
        TaskState::Completed {
            output: TaskOutput::Profile(profile),
        } => assert_eq!(profile.name, "Widget"),
        other => panic!("unexpected state: {:?}", other),
    }
    assert_eq!(harness.store().active_count(), 0);
}

#[tokio::test]
async fn test_identification_from_url_only() {
    let harness = Harness::new(succeeding());

    let id = harness
        .runner
        .start_identification(
            credentials(),
            vec![],
            Some("https://shop.example.com/p/42".to_string()),
            AnalysisSettings::default(),
        )
        .unwrap();

    let task = wait_for_status(harness.store(), id, TaskStatus::Completed).await;
    assert_eq!(
        task.meta.source_url.as_deref(),
        Some("https://shop.example.com/p/42")
    );
}

#[tokio::test]
async fn test_identification_failure_is_recorded() {
    let harness = Harness::new(MockAnalysis::new(
        Behavior::QuotaExceeded,
        Behavior::QuotaExceeded,
    ));

    let id = harness
        .runner
        .start_identification(credentials(), vec![png(1)], None, AnalysisSettings::default())
        .unwrap();

    let task = wait_for_status(harness.store(), id, TaskStatus::Failed).await;
    match task.state {
        TaskState::Failed { error } => {
            assert_eq!(error.kind, FailureKind::Quota);
            assert!(error.message.contains("daily limit"));
        }
        other => panic!("unexpected state: {:?}", other),
    }
}

#[tokio::test]
async fn test_panicking_model_fails_as_internal() {
    let harness = Harness::new(MockAnalysis::new(Behavior::Panic, Behavior::Panic));

    let id = harness
        .runner
        .start_identification(credentials(), vec![png(1)], None, AnalysisSettings::default())
        .unwrap();

    let task = wait_for_status(harness.store(), id, TaskStatus::Failed).await;
    match task.state {
        TaskState::Failed { error } => assert_eq!(error.kind, FailureKind::Internal),
        other => panic!("unexpected state: {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_input_creates_no_task() {
    let harness = Harness::new(succeeding());

    let err = harness
        .runner
        .start_identification(credentials(), vec![], None, AnalysisSettings::default())
        .unwrap_err();
    assert!(matches!(
        err,
        StartError::Input(InputError::NothingToIdentify)
    ));

    let err = harness
        .runner
        .start_identification(
            credentials(),
            vec![],
            Some("javascript:alert(1)".to_string()),
            AnalysisSettings::default(),
        )
        .unwrap_err();
    assert!(matches!(err, StartError::Input(InputError::InvalidUrl(_))));

    let err = harness
        .runner
        .start_qc(
            credentials(),
            widget(),
            vec![],
            vec![],
            AnalysisSettings::default(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        StartError::Input(InputError::NoInspectionImages)
    ));

    assert!(harness.store().list().is_empty());
    assert_eq!(harness.mock.responses(), 0);
}

#[tokio::test]
async fn test_confirmation_flow() {
    let harness = Harness::new(succeeding());
    let settings = AnalysisSettings {
        confirm_identification: true,
        ..Default::default()
    };

    let id = harness
        .runner
        .start_identification(credentials(), vec![png(1)], None, settings)
        .unwrap();

    let task = wait_for_status(harness.store(), id, TaskStatus::AwaitingFeedback).await;
    assert!(matches!(task.state, TaskState::AwaitingFeedback { .. }));
    assert_eq!(harness.store().active_count(), 0);

    let mut edited = widget_profile();
    edited.name = "Widget Pro".to_string();
    let confirmed = harness
        .runner
        .confirm_identification(id, Some(edited))
        .unwrap();
    assert_eq!(confirmed.name, "Widget Pro");

    let task = harness.store().get(id).unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);

    // A settled task cannot be confirmed twice.
    let err = harness.runner.confirm_identification(id, None).unwrap_err();
    assert!(matches!(err, FeedbackError::NotAwaitingFeedback(_)));
}

#[tokio::test]
async fn test_confirmation_rejects_invalid_profile() {
    let harness = Harness::new(succeeding());
    let settings = AnalysisSettings {
        confirm_identification: true,
        ..Default::default()
    };
    let id = harness
        .runner
        .start_identification(credentials(), vec![png(1)], None, settings)
        .unwrap();
    wait_for_status(harness.store(), id, TaskStatus::AwaitingFeedback).await;

    let err = harness
        .runner
        .confirm_identification(id, Some(ProductProfile::named("")))
        .unwrap_err();
    assert!(matches!(err, FeedbackError::InvalidProfile(_)));
    assert_eq!(
        harness.store().get(id).unwrap().status(),
        TaskStatus::AwaitingFeedback
    );

    let err = harness
        .runner
        .confirm_identification(TaskId::new(), None)
        .unwrap_err();
    assert!(matches!(err, FeedbackError::NotFound(_)));
}

#[tokio::test]
async fn test_qc_records_batch_and_report() {
    let harness = Harness::new(succeeding());
    let product = widget();
    harness.repository.save_product(&product).await.unwrap();

    let id = harness.start_qc(product.clone(), &[7]);
    let task = harness.store().get(id).unwrap();
    assert_eq!(task.kind, TaskKind::Qc);
    assert_eq!(task.meta.title, "QC: Widget");
    assert_eq!(task.meta.product_id, Some(product.id));

    wait_for_status(harness.store(), id, TaskStatus::Completed).await;

    let saved = harness
        .repository
        .get_product(product.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.qc_batches.len(), 1);
    assert_eq!(saved.reports.len(), 1);
    assert_eq!(saved.latest_report().unwrap().overall_score, 92);

    let new_id = saved.qc_batches[0].image_ids[0];
    assert_eq!(saved.qc_batches[0].image_ids.len(), 1);
    assert_eq!(
        harness.repository.get_image(new_id).await.unwrap(),
        Some(png(7))
    );

    // The catalog reflects the new report.
    let cached = harness.runner.catalog().get(product.id).await.unwrap();
    assert_eq!(cached.reports.len(), 1);
}

#[tokio::test]
async fn test_qc_submits_cumulative_history_in_order() {
    let harness = Harness::new(succeeding());
    let (product, history) = product_with_history(&harness.repository).await;

    let id = harness.start_qc(product.clone(), &[9]);
    wait_for_status(harness.store(), id, TaskStatus::Completed).await;

    let calls = harness.mock.inspection_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], vec![png(1), png(2), png(3), png(9)]);
    assert_eq!(harness.mock.reference_calls()[0], vec![png(200)]);

    let saved = harness
        .repository
        .get_product(product.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.qc_batches.len(), 3);
    assert_eq!(saved.reports.len(), 3);
    // Earlier batches are untouched.
    assert_eq!(saved.qc_batches[0].image_ids, vec![history[0], history[1]]);
    assert_eq!(saved.qc_batches[1].image_ids, vec![history[2]]);
    assert!(!history.contains(&saved.qc_batches[2].image_ids[0]));
}

#[tokio::test]
async fn test_qc_skips_unresolvable_history() {
    let harness = Harness::new(succeeding());
    let (mut product, _) = product_with_history(&harness.repository).await;
    product.qc_batches[0].image_ids.insert(1, ImageId::new());
    harness.repository.save_product(&product).await.unwrap();

    let id = harness.start_qc(product, &[9]);
    wait_for_status(harness.store(), id, TaskStatus::Completed).await;

    assert_eq!(
        harness.mock.inspection_calls()[0],
        vec![png(1), png(2), png(3), png(9)]
    );
}

#[tokio::test]
async fn test_failed_qc_persists_nothing() {
    let harness = Harness::new(MockAnalysis::new(
        Behavior::Succeed(widget_profile()),
        Behavior::QuotaExceeded,
    ));
    let (product, _) = product_with_history(&harness.repository).await;
    let images_before = harness.repository.image_count().await;

    let id = harness.start_qc(product.clone(), &[9, 10]);
    let task = wait_for_status(harness.store(), id, TaskStatus::Failed).await;
    match task.state {
        TaskState::Failed { error } => assert_eq!(error.kind, FailureKind::Quota),
        other => panic!("unexpected state: {:?}", other),
    }

    let saved = harness
        .repository
        .get_product(product.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved, product);
    assert_eq!(harness.repository.image_count().await, images_before);
}

#[tokio::test]
async fn test_dismissed_task_drops_late_result() {
    let (mock, gate) = succeeding().gated();
    let harness = Harness::new(mock);
    let product = widget();
    harness.repository.save_product(&product).await.unwrap();

    let id = harness.start_qc(product.clone(), &[7]);
    assert!(harness.runner.dismiss(id));
    assert!(!harness.runner.dismiss(id));
    assert!(harness.store().list().is_empty());

    gate.add_permits(1);
    wait_for_responses(&harness.mock, 1).await;

    // The work still ran to completion, but the record stays gone.
    assert!(harness.store().get(id).is_none());
    let saved = harness
        .repository
        .get_product(product.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.reports.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tasks_resolve_independently() {
    let harness = Harness::new(succeeding());

    let ids: Vec<TaskId> = (0..16)
        .map(|i| {
            harness
                .runner
                .start_identification(
                    credentials(),
                    vec![png(i)],
                    None,
                    AnalysisSettings::default(),
                )
                .unwrap()
        })
        .collect();

    let unique: HashSet<TaskId> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len());

    let waits = ids
        .iter()
        .map(|id| wait_for_status(harness.store(), *id, TaskStatus::Completed));
    let settled = futures::future::join_all(waits).await;
    assert!(settled.iter().all(|t| t.status() == TaskStatus::Completed));

    // Most recent first.
    let listed: Vec<TaskId> = harness.store().list().iter().map(|t| t.id).collect();
    let mut expected = ids.clone();
    expected.reverse();
    assert_eq!(listed, expected);
    assert_eq!(harness.store().active_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_qc_runs_both_append() {
    let (mock, gate) = succeeding().gated();
    let harness = Harness::new(mock);
    let product = widget();
    harness.repository.save_product(&product).await.unwrap();

    let first = harness.start_qc(product.clone(), &[7]);
    let second = harness.start_qc(product.clone(), &[8]);
    gate.add_permits(2);
    wait_for_status(harness.store(), first, TaskStatus::Completed).await;
    wait_for_status(harness.store(), second, TaskStatus::Completed).await;

    let saved = harness
        .repository
        .get_product(product.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.qc_batches.len(), 2);
    assert_eq!(saved.reports.len(), 2);
    assert_eq!(harness.repository.image_count().await, 2);
    for id in saved.inspection_history() {
        assert!(harness.repository.get_image(*id).await.unwrap().is_some());
    }

    // Whichever run went second saw the other's images as history.
    let mut calls = harness.mock.inspection_calls();
    calls.sort_by_key(|images| images.len());
    assert_eq!(calls[0].len(), 1);
    assert_eq!(calls[1].len(), 2);
    assert_eq!(calls[1][0], calls[0][0]);

    let cached = harness.runner.catalog().get(product.id).await.unwrap();
    assert_eq!(cached.reports.len(), 2);
}

#[tokio::test]
async fn test_qc_on_deleted_product_fails_as_storage() {
    let harness = Harness::new(succeeding());

    let id = harness.start_qc(widget(), &[7]);
    let task = wait_for_status(harness.store(), id, TaskStatus::Failed).await;
    match task.state {
        TaskState::Failed { error } => assert_eq!(error.kind, FailureKind::Storage),
        other => panic!("unexpected state: {:?}", other),
    }
    assert!(harness.mock.inspection_calls().is_empty());
}

/// Runner over a repository that already holds `product`, with a warm catalog.
async fn flaky_runner(
    product: &Product,
) -> (TaskRunner<MockAnalysis, FlakyRepository>, Arc<FlakyRepository>) {
    let repository = Arc::new(FlakyRepository::default());
    repository.save_product(product).await.unwrap();
    let catalog = Arc::new(ProductCache::new());
    catalog.refresh(repository.as_ref()).await.unwrap();

    let runner = TaskRunner::new(
        TaskStore::new(),
        Arc::new(succeeding()),
        Arc::clone(&repository),
        catalog,
    );
    (runner, repository)
}

fn start_flaky_qc(runner: &TaskRunner<MockAnalysis, FlakyRepository>, product: &Product) -> TaskId {
    runner
        .start_qc(
            credentials(),
            product.clone(),
            vec![],
            vec![png(7)],
            AnalysisSettings::default(),
        )
        .unwrap()
}

#[tokio::test]
async fn test_product_save_failure_fails_as_storage() {
    let product = widget();
    let (runner, repository) = flaky_runner(&product).await;
    repository.fail_saves();

    let id = start_flaky_qc(&runner, &product);
    let task = wait_for_status(runner.store(), id, TaskStatus::Failed).await;
    match task.state {
        TaskState::Failed { error } => assert_eq!(error.kind, FailureKind::Storage),
        other => panic!("unexpected state: {:?}", other),
    }

    let stored = repository.get_product(product.id).await.unwrap().unwrap();
    assert!(stored.reports.is_empty());
    let cached = runner.catalog().get(product.id).await.unwrap();
    assert!(cached.reports.is_empty());
}

#[tokio::test]
async fn test_cache_refresh_failure_fails_as_storage() {
    let product = widget();
    let (runner, repository) = flaky_runner(&product).await;
    repository.fail_listing();

    let id = start_flaky_qc(&runner, &product);
    let task = wait_for_status(runner.store(), id, TaskStatus::Failed).await;
    match task.state {
        TaskState::Failed { error } => assert_eq!(error.kind, FailureKind::Storage),
        other => panic!("unexpected state: {:?}", other),
    }

    // The product row was written before the refresh failed; the cache is stale.
    let stored = repository.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(stored.reports.len(), 1);
    let cached = runner.catalog().get(product.id).await.unwrap();
    assert!(cached.reports.is_empty());
}
