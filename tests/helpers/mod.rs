//! In-memory fakes for the pipeline's injected capabilities.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use studygen::db::{ContentRepo, RepoError};
use studygen::models::artifact::{FlashcardSetRecord, QuizSetRecord, SummaryRecord};
use studygen::models::job::{JobMetadata, JobRecord};
use studygen::models::package::{Package, PackageStatus};
use studygen::services::generation::{GenerationError, TextGenerator};
use studygen::services::job_store::{JobStore, JobStoreError};
use studygen::services::storage::{BlobStore, StorageError};

/// One scripted generation-capability response.
#[derive(Clone)]
pub enum Script {
    Ok(&'static str),
    Fail(&'static str),
}

/// Returns scripted responses in order; errors if the script runs dry.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Script>>,
}

impl ScriptedGenerator {
    pub fn new(steps: Vec<Script>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _system: &str, _user: &str) -> Result<String, GenerationError> {
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Script::Ok(text)) => Ok(text.to_string()),
            Some(Script::Fail(reason)) => Err(GenerationError::Api {
                status: 500,
                body: reason.to_string(),
            }),
            None => Err(GenerationError::Empty),
        }
    }

    fn model_name(&self) -> &str {
        "test-model"
    }
}

/// Blob store over a HashMap; can be told to reject keys containing a pattern.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, (Vec<u8>, String)>>,
    fail_keys_containing: Option<String>,
}

impl MemoryBlobStore {
    pub fn failing_on(pattern: &str) -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
            fail_keys_containing: Some(pattern.to_string()),
        }
    }

    pub fn contents(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(key).map(|(data, _)| data.clone())
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        if let Some(pattern) = &self.fail_keys_containing {
            if key.contains(pattern.as_str()) {
                return Err(StorageError::Rejected(format!("injected failure for {key}")));
            }
        }
        self.blobs
            .lock()
            .unwrap()
            .insert(key.to_string(), (data.to_vec(), content_type.to_string()));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .lock()
            .unwrap()
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| StorageError::Rejected(format!("not found: {key}")))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.blobs.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Job store that keeps every write, so tests can assert on the sequence a
/// poller would observe.
#[derive(Default)]
pub struct MemoryJobStore {
    writes: Mutex<Vec<JobRecord>>,
}

impl MemoryJobStore {
    pub fn history(&self, job_id: &str) -> Vec<JobRecord> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn put(
        &self,
        _job_id: &str,
        record: &JobRecord,
        _ttl_secs: u64,
    ) -> Result<(), JobStoreError> {
        self.writes.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, JobStoreError> {
        Ok(self
            .writes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.job_id == job_id)
            .cloned())
    }
}

/// In-memory relational store for packages and artifact rows.
#[derive(Default)]
pub struct MemoryRepo {
    packages: Mutex<HashMap<Uuid, Package>>,
    summaries: Mutex<HashMap<Uuid, SummaryRecord>>,
    flashcard_sets: Mutex<HashMap<Uuid, FlashcardSetRecord>>,
    quiz_sets: Mutex<HashMap<Uuid, QuizSetRecord>>,
}

impl MemoryRepo {
    /// Ids of every package inserted, for tests that need to find the run's
    /// package without threading the id out of the pipeline.
    pub fn package_ids(&self) -> Vec<Uuid> {
        self.packages.lock().unwrap().keys().copied().collect()
    }

    /// (summaries, flashcard sets, quiz sets) row counts across all packages.
    pub fn row_counts(&self) -> (usize, usize, usize) {
        (
            self.summaries.lock().unwrap().len(),
            self.flashcard_sets.lock().unwrap().len(),
            self.quiz_sets.lock().unwrap().len(),
        )
    }
}

#[async_trait]
impl ContentRepo for MemoryRepo {
    async fn insert_package(&self, package: &Package) -> Result<(), RepoError> {
        self.packages
            .lock()
            .unwrap()
            .insert(package.id, package.clone());
        Ok(())
    }

    async fn mark_package_completed(&self, package_id: Uuid) -> Result<(), RepoError> {
        let mut packages = self.packages.lock().unwrap();
        let package = packages
            .get_mut(&package_id)
            .ok_or_else(|| RepoError::Backend(format!("unknown package {package_id}")))?;
        package.status = PackageStatus::Completed;
        Ok(())
    }

    async fn get_package(&self, package_id: Uuid) -> Result<Option<Package>, RepoError> {
        Ok(self.packages.lock().unwrap().get(&package_id).cloned())
    }

    async fn insert_summary(&self, record: &SummaryRecord) -> Result<(), RepoError> {
        self.summaries
            .lock()
            .unwrap()
            .insert(record.package_id, record.clone());
        Ok(())
    }

    async fn insert_flashcard_set(&self, record: &FlashcardSetRecord) -> Result<(), RepoError> {
        self.flashcard_sets
            .lock()
            .unwrap()
            .insert(record.package_id, record.clone());
        Ok(())
    }

    async fn insert_quiz_set(&self, record: &QuizSetRecord) -> Result<(), RepoError> {
        self.quiz_sets
            .lock()
            .unwrap()
            .insert(record.package_id, record.clone());
        Ok(())
    }

    async fn summary_for_package(
        &self,
        package_id: Uuid,
    ) -> Result<Option<SummaryRecord>, RepoError> {
        Ok(self.summaries.lock().unwrap().get(&package_id).cloned())
    }

    async fn flashcard_set_for_package(
        &self,
        package_id: Uuid,
    ) -> Result<Option<FlashcardSetRecord>, RepoError> {
        Ok(self.flashcard_sets.lock().unwrap().get(&package_id).cloned())
    }

    async fn quiz_set_for_package(
        &self,
        package_id: Uuid,
    ) -> Result<Option<QuizSetRecord>, RepoError> {
        Ok(self.quiz_sets.lock().unwrap().get(&package_id).cloned())
    }
}

/// Metadata for the canonical test job.
pub fn sample_metadata() -> JobMetadata {
    JobMetadata {
        user_id: "user-1".to_string(),
        document_id: None,
        topic: "Endodontics".to_string(),
        topic_slug: "endodontics".to_string(),
        flashcard_count: 5,
        question_count: 5,
        source_key: None,
    }
}

/// Everything a pipeline test needs, wired over the in-memory fakes.
pub struct TestHarness {
    pub pipeline: studygen::services::pipeline::GenerationPipeline,
    pub jobs: Arc<MemoryJobStore>,
    pub repo: Arc<MemoryRepo>,
    pub blobs: Arc<MemoryBlobStore>,
}

pub fn harness(script: Vec<Script>, blobs: MemoryBlobStore) -> TestHarness {
    use studygen::services::artifacts::ArtifactStore;
    use studygen::services::pipeline::GenerationPipeline;

    let jobs = Arc::new(MemoryJobStore::default());
    let repo = Arc::new(MemoryRepo::default());
    let blobs = Arc::new(blobs);
    let generator = Arc::new(ScriptedGenerator::new(script));

    let artifacts = ArtifactStore::new(blobs.clone(), repo.clone());
    let pipeline = GenerationPipeline::new(generator, artifacts, repo.clone());

    TestHarness {
        pipeline,
        jobs,
        repo,
        blobs,
    }
}
