use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::models::job::{JobMetadata, JobRecord, JobUpdate};

const JOB_KEY_PREFIX: &str = "studygen:jobs";

/// Jobs are transient progress tickets, not durable records.
pub const JOB_TTL_SECS: u64 = 3600;

/// Key-value store for ephemeral job progress records.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn put(
        &self,
        job_id: &str,
        record: &JobRecord,
        ttl_secs: u64,
    ) -> Result<(), JobStoreError>;
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, JobStoreError>;
}

/// Redis-backed job store; records expire after their TTL.
pub struct RedisJobStore {
    client: redis::Client,
}

impl RedisJobStore {
    pub fn new(redis_url: &str) -> Result<Self, JobStoreError> {
        let client = redis::Client::open(redis_url).map_err(JobStoreError::Redis)?;
        Ok(Self { client })
    }

    fn key(job_id: &str) -> String {
        format!("{JOB_KEY_PREFIX}:{job_id}")
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), JobStoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(JobStoreError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(JobStoreError::Redis)?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn put(
        &self,
        job_id: &str,
        record: &JobRecord,
        ttl_secs: u64,
    ) -> Result<(), JobStoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(JobStoreError::Redis)?;
        let payload = serde_json::to_string(record).map_err(JobStoreError::Serialize)?;
        conn.set_ex::<_, _, ()>(Self::key(job_id), &payload, ttl_secs)
            .await
            .map_err(JobStoreError::Redis)?;
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, JobStoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(JobStoreError::Redis)?;
        let payload: Option<String> = conn
            .get(Self::key(job_id))
            .await
            .map_err(JobStoreError::Redis)?;

        match payload {
            Some(p) => {
                let record: JobRecord =
                    serde_json::from_str(&p).map_err(JobStoreError::Serialize)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

/// Callback-style status sink bound to one job.
///
/// Every report overwrites the whole job record, re-attaching the immutable
/// metadata so a reader never has to reconstruct state from partial writes.
/// Progress is clamped to be non-decreasing within the job's lifetime.
/// Reporting is side-effect-only: a failed write is logged, never propagated,
/// so a flaky status store cannot fail a healthy generation run.
pub struct StatusReporter {
    store: Arc<dyn JobStore>,
    job_id: String,
    metadata: JobMetadata,
    last_progress: AtomicU8,
}

impl StatusReporter {
    pub fn new(store: Arc<dyn JobStore>, job_id: String, metadata: JobMetadata) -> Self {
        Self {
            store,
            job_id,
            metadata,
            last_progress: AtomicU8::new(0),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn metadata(&self) -> &JobMetadata {
        &self.metadata
    }

    pub async fn report(&self, update: JobUpdate) {
        let progress = self.last_progress.fetch_max(update.progress, Ordering::SeqCst);
        let progress = progress.max(update.progress);

        let record = JobRecord {
            job_id: self.job_id.clone(),
            metadata: self.metadata.clone(),
            status: update.status,
            progress,
            message: update.message,
            result_id: update.result_id,
            error: update.error,
        };

        if let Err(e) = self.store.put(&self.job_id, &record, JOB_TTL_SECS).await {
            tracing::warn!(job_id = %self.job_id, error = %e, "failed to write job status");
        } else {
            tracing::debug!(
                job_id = %self.job_id,
                status = %record.status,
                progress = record.progress,
                "job status reported"
            );
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Job store error: {0}")]
    Backend(String),
}
