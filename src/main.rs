use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use product_qc::{
    app_state::AppState,
    config::AppConfig,
    db::{self, PgRepository},
    models::Credentials,
    routes,
    services::{
        analysis::GeminiClient,
        repository::{InMemoryRepository, Repository},
        storage::ImageStore,
    },
};

/// Inspection batches carry several full-resolution photos.
const BODY_LIMIT_BYTES: usize = 25 * 1024 * 1024;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing product-qc server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!("qc_tasks_started_total", "Background tasks started");
    metrics::describe_counter!(
        "qc_tasks_completed_total",
        "Background tasks that produced a result"
    );
    metrics::describe_counter!("qc_tasks_failed_total", "Background tasks that failed");
    metrics::describe_histogram!(
        "qc_task_duration_seconds",
        "Wall time from task start to resolution"
    );
    metrics::describe_gauge!("qc_tasks_active", "Tasks currently processing");

    let repository = match config.durable_backend() {
        Some(backend) => {
            tracing::info!("Connecting to PostgreSQL database");
            let pool = db::init_pool(backend.database_url)
                .await
                .expect("Failed to connect to database");

            tracing::info!("Running database migrations");
            db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");

            tracing::info!("Initializing image storage client");
            let images = ImageStore::new(
                backend.s3_bucket,
                backend.s3_endpoint,
                backend.s3_access_key,
                backend.s3_secret_key,
            )
            .expect("Failed to initialize image storage");

            Repository::Postgres(PgRepository::new(pool, images))
        }
        None => {
            tracing::warn!("Database or image storage not configured, keeping products in memory");
            Repository::Memory(InMemoryRepository::new())
        }
    };

    tracing::info!(model = %config.ai_model, "Initializing vision model client");
    let analysis = GeminiClient::new(
        &config.ai_base_url,
        &config.ai_model,
        Duration::from_secs(config.ai_timeout_secs),
        config.max_image_dimension,
    )
    .expect("Failed to initialize vision model client");

    let backend = repository.backend_name();
    let state = AppState::new(
        analysis,
        repository,
        config.ai_api_key.as_deref().map(Credentials::new),
    );

    match state.catalog().refresh(state.repository()).await {
        Ok(count) => tracing::info!(backend, products = count, "Product cache loaded"),
        Err(e) => tracing::error!(backend, error = %e, "Failed to load product cache"),
    }

    let app = routes::router(state)
        .route(
            "/metrics",
            get(move || {
                let handle = Arc::clone(&prometheus_handle);
                async move { render_metrics(&handle) }
            }),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES));

    tracing::info!("Starting product-qc on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}

fn render_metrics(handle: &PrometheusHandle) -> String {
    handle.render()
}
