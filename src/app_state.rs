use sqlx::PgPool;
use std::sync::Arc;

use crate::db::ContentRepo;
use crate::services::{
    extract::TextExtractor,
    job_store::RedisJobStore,
    pipeline::{ActiveJobs, GenerationPipeline},
    storage::BlobStore,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub repo: Arc<dyn ContentRepo>,
    pub storage: Arc<dyn BlobStore>,
    pub jobs: Arc<RedisJobStore>,
    pub pipeline: Arc<GenerationPipeline>,
    pub extractor: Arc<dyn TextExtractor>,
    pub active_jobs: Arc<ActiveJobs>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        repo: Arc<dyn ContentRepo>,
        storage: Arc<dyn BlobStore>,
        jobs: Arc<RedisJobStore>,
        pipeline: GenerationPipeline,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            db,
            repo,
            storage,
            jobs,
            pipeline: Arc::new(pipeline),
            extractor,
            active_jobs: Arc::new(ActiveJobs::default()),
        }
    }
}
