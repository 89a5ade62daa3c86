mod app_state;
mod config;
mod db;
mod models;
mod routes;
mod services;

use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use db::PgContentRepo;
use services::{
    artifacts::ArtifactStore,
    extract::PlainTextExtractor,
    generation::WorkersAiClient,
    job_store::RedisJobStore,
    pipeline::GenerationPipeline,
    storage::R2Client,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing studygen server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_histogram!(
        "generation_stage_seconds",
        "Time spent in one generation stage (summary, flashcards, quiz)"
    );
    metrics::describe_counter!("study_jobs_total", "Total study generation jobs started");
    metrics::describe_counter!(
        "study_jobs_completed",
        "Total study generation jobs completed"
    );
    metrics::describe_counter!("study_jobs_failed", "Total study generation jobs that failed");
    metrics::describe_counter!(
        "generated_array_fallbacks_total",
        "Generated arrays that failed every parse candidate and fell back"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let repo = Arc::new(PgContentRepo::new(db_pool.clone()));

    // Initialize R2 storage client
    tracing::info!("Initializing R2 storage client");
    let storage = Arc::new(
        R2Client::new(
            &config.r2_bucket,
            &config.r2_endpoint,
            &config.r2_access_key,
            &config.r2_secret_key,
        )
        .expect("Failed to initialize R2 client"),
    );

    // Initialize Redis job status store
    tracing::info!("Connecting to Redis job store");
    let jobs = Arc::new(RedisJobStore::new(&config.redis_url).expect("Failed to initialize job store"));

    // Initialize Workers AI client
    tracing::info!(model = %config.generation_model, "Initializing Cloudflare Workers AI client");
    let generator = Arc::new(
        WorkersAiClient::new(
            config.cf_account_id.clone(),
            config.cf_api_token.clone(),
            config.generation_model.clone(),
            config.generation_timeout_secs,
        )
        .expect("Failed to initialize Workers AI client"),
    );

    // Assemble the generation pipeline
    let artifacts = ArtifactStore::new(storage.clone(), repo.clone());
    let pipeline = GenerationPipeline::new(generator, artifacts, repo.clone());

    // Create shared application state
    let state = AppState::new(
        db_pool,
        repo,
        storage,
        jobs,
        pipeline,
        Arc::new(PlainTextExtractor),
    );

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/study/generate", post(routes::generate::submit_topic))
        .route("/api/v1/study/upload", post(routes::generate::submit_upload))
        .route(
            "/api/v1/study/jobs/{job_id}",
            get(routes::generate::get_job).delete(routes::generate::cancel_job),
        )
        .route(
            "/api/v1/study/packages/{package_id}",
            get(routes::generate::get_package),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(25 * 1024 * 1024)); // 25 MB upload limit

    tracing::info!("Starting studygen on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
