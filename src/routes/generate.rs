use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::ContentRepo;
use crate::models::artifact::{FlashcardSetRecord, QuizSetRecord, SummaryRecord};
use crate::models::job::{topic_slug, JobMetadata, JobRecord, JobStatus, JobUpdate};
use crate::models::package::{Package, PackageStatus, SourceType};
use crate::services::extract::TextExtractor;
use crate::services::job_store::{JobStore, StatusReporter};
use crate::services::pipeline::{PipelineInput, PROGRESS_PARSING, PROGRESS_SUMMARIZING, PROGRESS_UPLOADED};
use crate::services::storage::BlobStore;

const DEFAULT_FLASHCARD_COUNT: u32 = 10;
const DEFAULT_QUESTION_COUNT: u32 = 10;

/// Request to generate study material from a topic alone.
#[derive(Debug, Deserialize, Validate)]
pub struct GenerateRequest {
    #[garde(length(min = 1, max = 200))]
    pub topic: String,

    #[garde(length(min = 1, max = 100))]
    pub user_id: String,

    #[garde(range(min = 1, max = 50))]
    #[serde(default = "default_flashcard_count")]
    pub flashcard_count: u32,

    #[garde(range(min = 1, max = 50))]
    #[serde(default = "default_question_count")]
    pub question_count: u32,
}

fn default_flashcard_count() -> u32 {
    DEFAULT_FLASHCARD_COUNT
}

fn default_question_count() -> u32 {
    DEFAULT_QUESTION_COUNT
}

/// Response after submitting a generation job.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
}

/// POST /api/v1/study/generate — start a topic-only generation job.
pub async fn submit_topic(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<GenerateResponse>), (StatusCode, String)> {
    req.validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let job_id = Uuid::new_v4().to_string();
    let metadata = JobMetadata {
        user_id: req.user_id,
        document_id: None,
        topic: req.topic.clone(),
        topic_slug: topic_slug(&req.topic),
        flashcard_count: req.flashcard_count,
        question_count: req.question_count,
        source_key: None,
    };

    let input = PipelineInput {
        user_id: metadata.user_id.clone(),
        topic: metadata.topic.clone(),
        topic_slug: metadata.topic_slug.clone(),
        source_type: SourceType::Ai,
        source_path: None,
        source_content: None,
        flashcard_count: metadata.flashcard_count,
        question_count: metadata.question_count,
    };

    let reporter = StatusReporter::new(state.jobs.clone(), job_id.clone(), metadata);
    // Job record exists before any heavy work begins.
    reporter
        .report(JobUpdate::new(
            JobStatus::Summarizing,
            PROGRESS_SUMMARIZING,
            "Queued for generation",
        ))
        .await;

    spawn_job(state, input, reporter);

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse {
            job_id,
            status: JobStatus::Summarizing,
            message: "Study material generation started".to_string(),
        }),
    ))
}

/// POST /api/v1/study/upload — start a generation job from an uploaded document.
///
/// Multipart fields: `file` (document bytes), `topic`, `user_id`, optional
/// `flashcard_count` and `question_count`.
pub async fn submit_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<GenerateResponse>), (StatusCode, String)> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut topic: Option<String> = None;
    let mut user_id: Option<String> = None;
    let mut flashcard_count = DEFAULT_FLASHCARD_COUNT;
    let mut question_count = DEFAULT_QUESTION_COUNT;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
                file_data = Some(data.to_vec());
            }
            "topic" => {
                topic = Some(text_field(field).await?);
            }
            "user_id" => {
                user_id = Some(text_field(field).await?);
            }
            "flashcard_count" => {
                flashcard_count = count_field(field, "flashcard_count").await?;
            }
            "question_count" => {
                question_count = count_field(field, "question_count").await?;
            }
            _ => {}
        }
    }

    // Ingress validation happens before any Job or Package side effects.
    let file_data = file_data
        .filter(|d| !d.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "missing file".to_string()))?;
    let topic = topic
        .filter(|t| !t.trim().is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "missing topic".to_string()))?;
    let user_id = user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "missing user_id".to_string()))?;
    if !(1..=50).contains(&flashcard_count) || !(1..=50).contains(&question_count) {
        return Err((
            StatusCode::BAD_REQUEST,
            "counts must be between 1 and 50".to_string(),
        ));
    }

    let job_id = Uuid::new_v4().to_string();
    let document_id = Uuid::new_v4().to_string();
    let source_key = format!("uploads/{user_id}/{document_id}");

    state
        .storage
        .put(&source_key, &file_data, "application/octet-stream")
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to store uploaded source");
            (StatusCode::BAD_GATEWAY, "failed to store upload".to_string())
        })?;

    let metadata = JobMetadata {
        user_id: user_id.clone(),
        document_id: Some(document_id),
        topic: topic.clone(),
        topic_slug: topic_slug(&topic),
        flashcard_count,
        question_count,
        source_key: Some(source_key.clone()),
    };

    let reporter = StatusReporter::new(state.jobs.clone(), job_id.clone(), metadata);
    reporter
        .report(JobUpdate::new(
            JobStatus::Uploaded,
            PROGRESS_UPLOADED,
            "Document received",
        ))
        .await;

    let source_content = match state.extractor.extract(&file_data).await {
        Ok(text) => text,
        Err(e) => {
            reporter.report(JobUpdate::failed(e.to_string())).await;
            return Err((StatusCode::UNPROCESSABLE_ENTITY, e.to_string()));
        }
    };

    reporter
        .report(JobUpdate::new(
            JobStatus::Parsing,
            PROGRESS_PARSING,
            "Document text extracted",
        ))
        .await;

    let input = PipelineInput {
        user_id,
        topic: topic.clone(),
        topic_slug: topic_slug(&topic),
        source_type: SourceType::Pdf,
        source_path: Some(source_key),
        source_content: Some(source_content),
        flashcard_count,
        question_count,
    };

    spawn_job(state, input, reporter);

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse {
            job_id,
            status: JobStatus::Parsing,
            message: "Study material generation started".to_string(),
        }),
    ))
}

/// GET /api/v1/study/jobs/{job_id} — poll the merged job record.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobRecord>, (StatusCode, String)> {
    let record = state.jobs.get(&job_id).await.map_err(|e| {
        tracing::error!(job_id = %job_id, error = %e, "job store read failed");
        (StatusCode::BAD_GATEWAY, "job store unavailable".to_string())
    })?;

    match record {
        Some(r) => Ok(Json(r)),
        None => Err((StatusCode::NOT_FOUND, "unknown or expired job".to_string())),
    }
}

/// DELETE /api/v1/study/jobs/{job_id} — cancel a running job.
///
/// Cancellation takes effect at the next stage boundary.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> StatusCode {
    if state.active_jobs.cancel(&job_id) {
        tracing::info!(job_id = %job_id, "cancellation requested");
        StatusCode::ACCEPTED
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Completed package with its artifact metadata.
#[derive(Debug, Serialize)]
pub struct PackageResponse {
    pub package: Package,
    pub summary: Option<SummaryRecord>,
    pub flashcard_set: Option<FlashcardSetRecord>,
    pub quiz_set: Option<QuizSetRecord>,
}

/// GET /api/v1/study/packages/{package_id} — fetch a completed package.
///
/// Packages still in "generating" are partial records from in-flight or
/// failed runs and are not servable for display.
pub async fn get_package(
    State(state): State<AppState>,
    Path(package_id): Path<Uuid>,
) -> Result<Json<PackageResponse>, (StatusCode, String)> {
    let package = state
        .repo
        .get_package(package_id)
        .await
        .map_err(|e| {
            tracing::error!(package_id = %package_id, error = %e, "package lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "lookup failed".to_string())
        })?
        .ok_or((StatusCode::NOT_FOUND, "unknown package".to_string()))?;

    if package.status != PackageStatus::Completed {
        return Err((
            StatusCode::CONFLICT,
            "package generation is not complete".to_string(),
        ));
    }

    let summary = state
        .repo
        .summary_for_package(package_id)
        .await
        .map_err(repo_error)?;
    let flashcard_set = state
        .repo
        .flashcard_set_for_package(package_id)
        .await
        .map_err(repo_error)?;
    let quiz_set = state
        .repo
        .quiz_set_for_package(package_id)
        .await
        .map_err(repo_error)?;

    Ok(Json(PackageResponse {
        package,
        summary,
        flashcard_set,
        quiz_set,
    }))
}

fn repo_error(e: crate::db::RepoError) -> (StatusCode, String) {
    tracing::error!(error = %e, "artifact lookup failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "lookup failed".to_string())
}

/// Run the pipeline as a detached task. The ingress task is the single
/// place that writes the terminal FAILED status; the orchestrator itself
/// never swallows a stage error.
fn spawn_job(state: AppState, input: PipelineInput, reporter: StatusReporter) {
    let token = state.active_jobs.register(reporter.job_id());

    tokio::spawn(async move {
        let job_id = reporter.job_id().to_string();
        if let Err(e) = state.pipeline.run(&input, &reporter, &token).await {
            metrics::counter!("study_jobs_failed").increment(1);
            tracing::error!(job_id = %job_id, error = %e, "generation job failed");
            reporter.report(JobUpdate::failed(e.to_string())).await;
        }
        state.active_jobs.remove(&job_id);
    });
}

async fn text_field(
    field: axum::extract::multipart::Field<'_>,
) -> Result<String, (StatusCode, String)> {
    field
        .text()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

async fn count_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<u32, (StatusCode, String)> {
    text_field(field)
        .await?
        .trim()
        .parse()
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("invalid {name}")))
}
