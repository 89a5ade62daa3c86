use std::sync::Arc;

use studygen::{
    config::AppConfig,
    db::{self, ContentRepo, PgContentRepo},
    models::job::{JobMetadata, JobStatus, JobUpdate},
    services::{
        job_store::{JobStore, RedisJobStore},
        storage::{BlobStore, R2Client},
    },
};
use uuid::Uuid;

/// Integration test against live infrastructure.
///
/// Verifies:
/// 1. Database connection, migrations, and package queries
/// 2. R2 storage (put/get/delete)
/// 3. Redis job store writes with TTL and reads
///
/// Note: This requires a running PostgreSQL and Redis instance plus R2
/// credentials configured via environment variables.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_live_infrastructure() {
    let config = AppConfig::from_env().expect("Failed to load config");

    // Database
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");
    let repo = PgContentRepo::new(db_pool);

    // R2
    let storage = R2Client::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
    )
    .expect("Failed to initialize R2");

    let test_key = format!("test/{}.md", Uuid::new_v4());
    storage
        .put(&test_key, b"# integration test", "text/markdown")
        .await
        .expect("R2 put failed");
    let fetched = storage.get(&test_key).await.expect("R2 get failed");
    assert_eq!(fetched, b"# integration test");

    // Job store
    let jobs = Arc::new(RedisJobStore::new(&config.redis_url).expect("Failed to initialize job store"));
    jobs.health_check().await.expect("Redis ping failed");

    let job_id = Uuid::new_v4().to_string();
    let metadata = JobMetadata {
        user_id: "integration-test".to_string(),
        document_id: None,
        topic: "Endodontics".to_string(),
        topic_slug: "endodontics".to_string(),
        flashcard_count: 5,
        question_count: 5,
        source_key: None,
    };
    let reporter = studygen::services::job_store::StatusReporter::new(
        jobs.clone(),
        job_id.clone(),
        metadata.clone(),
    );

    reporter
        .report(JobUpdate::new(JobStatus::Summarizing, 45, "Summarizing"))
        .await;

    let record = jobs
        .get(&job_id)
        .await
        .expect("job store get failed")
        .expect("job record missing");
    assert_eq!(record.status, JobStatus::Summarizing);
    assert_eq!(record.metadata, metadata);

    // Relational: unknown package lookups are clean misses
    let missing = repo
        .get_package(Uuid::new_v4())
        .await
        .expect("package lookup failed");
    assert!(missing.is_none());

    // Cleanup
    storage.delete(&test_key).await.expect("R2 delete failed");

    println!("All integration checks passed");
}
