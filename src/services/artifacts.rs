use std::sync::Arc;

use base64::Engine;
use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::db::{ContentRepo, RepoError};
use crate::models::artifact::{Flashcard, FlashcardSetRecord, QuizQuestion, QuizSetRecord, SummaryRecord};
use crate::services::storage::{BlobStore, StorageError};

/// Persists one artifact as a content blob plus a metadata row.
///
/// Invariant: the metadata row is inserted only after the blob `put`
/// returns, so a row never exists without its content.
pub struct ArtifactStore {
    blobs: Arc<dyn BlobStore>,
    repo: Arc<dyn ContentRepo>,
}

impl ArtifactStore {
    pub fn new(blobs: Arc<dyn BlobStore>, repo: Arc<dyn ContentRepo>) -> Self {
        Self { blobs, repo }
    }

    pub async fn store_summary(
        &self,
        package_id: Uuid,
        user_id: &str,
        model: &str,
        markdown: &str,
    ) -> Result<SummaryRecord, ArtifactError> {
        let id = Uuid::new_v4();
        let path = artifact_path(user_id, package_id, "summary", id, "md");

        self.blobs
            .put(&path, markdown.as_bytes(), "text/markdown")
            .await?;

        let record = SummaryRecord {
            id,
            package_id,
            user_id: user_id.to_string(),
            blob_path: path,
            model: model.to_string(),
            content_hash: content_hash(markdown),
            created_at: Utc::now(),
        };
        self.repo.insert_summary(&record).await?;

        Ok(record)
    }

    pub async fn store_flashcards(
        &self,
        package_id: Uuid,
        user_id: &str,
        model: &str,
        cards: &[Flashcard],
    ) -> Result<FlashcardSetRecord, ArtifactError> {
        let id = Uuid::new_v4();
        let path = artifact_path(user_id, package_id, "flashcards", id, "json");
        let body = serde_json::to_vec(cards)?;

        self.blobs.put(&path, &body, "application/json").await?;

        let record = FlashcardSetRecord {
            id,
            package_id,
            user_id: user_id.to_string(),
            blob_path: path,
            card_count: cards.len() as i32,
            model: model.to_string(),
            created_at: Utc::now(),
        };
        self.repo.insert_flashcard_set(&record).await?;

        Ok(record)
    }

    pub async fn store_quiz(
        &self,
        package_id: Uuid,
        user_id: &str,
        model: &str,
        questions: &[QuizQuestion],
    ) -> Result<QuizSetRecord, ArtifactError> {
        let id = Uuid::new_v4();
        let path = artifact_path(user_id, package_id, "quiz", id, "json");
        let body = serde_json::to_vec(questions)?;

        self.blobs.put(&path, &body, "application/json").await?;

        let record = QuizSetRecord {
            id,
            package_id,
            user_id: user_id.to_string(),
            blob_path: path,
            question_count: questions.len() as i32,
            model: model.to_string(),
            created_at: Utc::now(),
        };
        self.repo.insert_quiz_set(&record).await?;

        Ok(record)
    }
}

fn artifact_path(user_id: &str, package_id: Uuid, kind: &str, artifact_id: Uuid, ext: &str) -> String {
    format!("study/{user_id}/packages/{package_id}/{kind}-{artifact_id}.{ext}")
}

/// SHA-256 over the summary text, base64-encoded. Recorded for future
/// dedup/integrity use; not consulted before writing.
fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(digest)
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Blob write failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Metadata row insert failed: {0}")]
    Repo(#[from] RepoError),

    #[error("Artifact serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_path_scoped_by_user_and_package() {
        let package = Uuid::new_v4();
        let artifact = Uuid::new_v4();
        let path = artifact_path("u42", package, "summary", artifact, "md");
        assert_eq!(
            path,
            format!("study/u42/packages/{package}/summary-{artifact}.md")
        );
    }

    #[test]
    fn test_content_hash_is_deterministic_base64() {
        let a = content_hash("pulp therapy");
        let b = content_hash("pulp therapy");
        assert_eq!(a, b);
        // SHA-256 is 32 bytes -> 44 base64 chars with padding.
        assert_eq!(a.len(), 44);
        assert_ne!(a, content_hash("pulp therapy "));
    }
}
