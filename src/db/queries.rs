use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::artifact::{FlashcardSetRecord, QuizSetRecord, SummaryRecord};
use crate::models::package::{Package, PackageStatus, SourceType};

/// Relational persistence for packages and artifact metadata rows.
///
/// The pipeline depends on this trait; production uses [`PgContentRepo`],
/// tests inject an in-memory implementation.
#[async_trait]
pub trait ContentRepo: Send + Sync {
    async fn insert_package(&self, package: &Package) -> Result<(), RepoError>;
    async fn mark_package_completed(&self, package_id: Uuid) -> Result<(), RepoError>;
    async fn get_package(&self, package_id: Uuid) -> Result<Option<Package>, RepoError>;

    async fn insert_summary(&self, record: &SummaryRecord) -> Result<(), RepoError>;
    async fn insert_flashcard_set(&self, record: &FlashcardSetRecord) -> Result<(), RepoError>;
    async fn insert_quiz_set(&self, record: &QuizSetRecord) -> Result<(), RepoError>;

    async fn summary_for_package(
        &self,
        package_id: Uuid,
    ) -> Result<Option<SummaryRecord>, RepoError>;
    async fn flashcard_set_for_package(
        &self,
        package_id: Uuid,
    ) -> Result<Option<FlashcardSetRecord>, RepoError>;
    async fn quiz_set_for_package(
        &self,
        package_id: Uuid,
    ) -> Result<Option<QuizSetRecord>, RepoError>;
}

/// PostgreSQL-backed repository.
pub struct PgContentRepo {
    pool: PgPool,
}

impl PgContentRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentRepo for PgContentRepo {
    async fn insert_package(&self, package: &Package) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO study_packages (id, user_id, topic, topic_slug, source_type, source_path, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(package.id)
        .bind(&package.user_id)
        .bind(&package.topic)
        .bind(&package.topic_slug)
        .bind(package.source_type.to_string())
        .bind(&package.source_path)
        .bind(package.status.to_string())
        .bind(package.created_at)
        .bind(package.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_package_completed(&self, package_id: Uuid) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            UPDATE study_packages
            SET status = 'completed', updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(package_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_package(&self, package_id: Uuid) -> Result<Option<Package>, RepoError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, topic, topic_slug, source_type, source_path, status, created_at, updated_at
            FROM study_packages
            WHERE id = $1
            "#,
        )
        .bind(package_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(package_from_row).transpose()
    }

    async fn insert_summary(&self, record: &SummaryRecord) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO study_summaries (id, package_id, user_id, blob_path, model, content_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.package_id)
        .bind(&record.user_id)
        .bind(&record.blob_path)
        .bind(&record.model)
        .bind(&record.content_hash)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_flashcard_set(&self, record: &FlashcardSetRecord) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO study_flashcard_sets (id, package_id, user_id, blob_path, card_count, model, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.package_id)
        .bind(&record.user_id)
        .bind(&record.blob_path)
        .bind(record.card_count)
        .bind(&record.model)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_quiz_set(&self, record: &QuizSetRecord) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO study_quiz_sets (id, package_id, user_id, blob_path, question_count, model, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.package_id)
        .bind(&record.user_id)
        .bind(&record.blob_path)
        .bind(record.question_count)
        .bind(&record.model)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn summary_for_package(
        &self,
        package_id: Uuid,
    ) -> Result<Option<SummaryRecord>, RepoError> {
        let row = sqlx::query(
            r#"
            SELECT id, package_id, user_id, blob_path, model, content_hash, created_at
            FROM study_summaries
            WHERE package_id = $1
            "#,
        )
        .bind(package_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(r) => Some(SummaryRecord {
                id: r.try_get("id")?,
                package_id: r.try_get("package_id")?,
                user_id: r.try_get("user_id")?,
                blob_path: r.try_get("blob_path")?,
                model: r.try_get("model")?,
                content_hash: r.try_get("content_hash")?,
                created_at: r.try_get("created_at")?,
            }),
            None => None,
        })
    }

    async fn flashcard_set_for_package(
        &self,
        package_id: Uuid,
    ) -> Result<Option<FlashcardSetRecord>, RepoError> {
        let row = sqlx::query(
            r#"
            SELECT id, package_id, user_id, blob_path, card_count, model, created_at
            FROM study_flashcard_sets
            WHERE package_id = $1
            "#,
        )
        .bind(package_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(r) => Some(FlashcardSetRecord {
                id: r.try_get("id")?,
                package_id: r.try_get("package_id")?,
                user_id: r.try_get("user_id")?,
                blob_path: r.try_get("blob_path")?,
                card_count: r.try_get("card_count")?,
                model: r.try_get("model")?,
                created_at: r.try_get("created_at")?,
            }),
            None => None,
        })
    }

    async fn quiz_set_for_package(
        &self,
        package_id: Uuid,
    ) -> Result<Option<QuizSetRecord>, RepoError> {
        let row = sqlx::query(
            r#"
            SELECT id, package_id, user_id, blob_path, question_count, model, created_at
            FROM study_quiz_sets
            WHERE package_id = $1
            "#,
        )
        .bind(package_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(r) => Some(QuizSetRecord {
                id: r.try_get("id")?,
                package_id: r.try_get("package_id")?,
                user_id: r.try_get("user_id")?,
                blob_path: r.try_get("blob_path")?,
                question_count: r.try_get("question_count")?,
                model: r.try_get("model")?,
                created_at: r.try_get("created_at")?,
            }),
            None => None,
        })
    }
}

fn package_from_row(row: sqlx::postgres::PgRow) -> Result<Package, RepoError> {
    let source_type_str: String = row.try_get("source_type")?;
    let status_str: String = row.try_get("status")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(Package {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        topic: row.try_get("topic")?,
        topic_slug: row.try_get("topic_slug")?,
        source_type: SourceType::from_str(&source_type_str)
            .map_err(|_| RepoError::Corrupt(format!("unknown source_type: {source_type_str}")))?,
        source_path: row.try_get("source_path")?,
        status: PackageStatus::from_str(&status_str)
            .map_err(|_| RepoError::Corrupt(format!("unknown status: {status_str}")))?,
        created_at,
        updated_at,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Repository error: {0}")]
    Backend(String),
}
