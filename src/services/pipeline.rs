use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::{ContentRepo, RepoError};
use crate::models::artifact::{Flashcard, QuizQuestion};
use crate::models::job::{JobStatus, JobUpdate};
use crate::models::package::{Package, PackageStatus, SourceType};
use crate::services::artifacts::{ArtifactError, ArtifactStore};
use crate::services::generation::{GenerationError, TextGenerator};
use crate::services::job_store::StatusReporter;
use crate::services::parser::parse_generated_array;

/// Progress floors for each reported state. Values are monotone across the
/// state machine; the reporter clamps any stragglers.
pub const PROGRESS_UPLOADED: u8 = 30;
pub const PROGRESS_PARSING: u8 = 40;
pub const PROGRESS_SUMMARIZING: u8 = 45;
pub const PROGRESS_FLASHCARDS: u8 = 65;
pub const PROGRESS_QUIZ: u8 = 85;

/// Prompts are built from a bounded prefix of the source document so prompt
/// size stays flat regardless of upload size.
const SOURCE_EXCERPT_MAX_CHARS: usize = 8000;

/// Everything the orchestrator needs to run one generation job.
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub user_id: String,
    pub topic: String,
    pub topic_slug: String,
    pub source_type: SourceType,
    pub source_path: Option<String>,
    /// Extracted text of the uploaded document, if any. When absent,
    /// prompts are built from the topic alone.
    pub source_content: Option<String>,
    pub flashcard_count: u32,
    pub question_count: u32,
}

/// Sequences the three generation stages and maintains the package record.
///
/// Stage errors propagate unmodified to the caller (the ingress task), which
/// is the single place that writes the terminal FAILED status. On failure
/// the package row stays in "generating" as diagnostic evidence; its
/// artifact rows reflect exactly the stages that finished.
pub struct GenerationPipeline {
    generator: Arc<dyn TextGenerator>,
    artifacts: ArtifactStore,
    repo: Arc<dyn ContentRepo>,
}

impl GenerationPipeline {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        artifacts: ArtifactStore,
        repo: Arc<dyn ContentRepo>,
    ) -> Self {
        Self {
            generator,
            artifacts,
            repo,
        }
    }

    /// Run all three stages for one job, reporting status before each.
    /// Returns the package id on success.
    pub async fn run(
        &self,
        input: &PipelineInput,
        reporter: &StatusReporter,
        cancel: &CancellationToken,
    ) -> Result<Uuid, PipelineError> {
        let package_id = Uuid::new_v4();
        let now = Utc::now();
        let package = Package {
            id: package_id,
            user_id: input.user_id.clone(),
            topic: input.topic.clone(),
            topic_slug: input.topic_slug.clone(),
            source_type: input.source_type,
            source_path: input.source_path.clone(),
            status: PackageStatus::Generating,
            created_at: now,
            updated_at: now,
        };
        self.repo.insert_package(&package).await?;

        tracing::info!(
            job_id = %reporter.job_id(),
            package_id = %package_id,
            topic = %input.topic,
            source_type = %input.source_type,
            "Starting generation pipeline"
        );
        metrics::counter!("study_jobs_total").increment(1);

        let excerpt = input.source_content.as_deref().map(source_excerpt);
        let model = self.generator.model_name().to_string();

        // ── Stage 1: summary ─────────────────────────────────────────────
        ensure_active(cancel)?;
        reporter
            .report(JobUpdate::new(
                JobStatus::Summarizing,
                PROGRESS_SUMMARIZING,
                format!("Summarizing {}", input.topic),
            ))
            .await;

        let start = Instant::now();
        let summary = self
            .generator
            .generate(SUMMARY_SYSTEM_PROMPT, &summary_prompt(&input.topic, excerpt))
            .await?;
        metrics::histogram!("generation_stage_seconds", "stage" => "summary")
            .record(start.elapsed().as_secs_f64());

        let summary_record = self
            .artifacts
            .store_summary(package_id, &input.user_id, &model, &summary)
            .await?;
        tracing::info!(
            job_id = %reporter.job_id(),
            blob_path = %summary_record.blob_path,
            "Summary stage complete"
        );

        // ── Stage 2: flashcards ──────────────────────────────────────────
        // Regenerated from the original source content, not from the
        // summary, so model drift does not compound across stages.
        ensure_active(cancel)?;
        reporter
            .report(JobUpdate::new(
                JobStatus::GeneratingFlashcards,
                PROGRESS_FLASHCARDS,
                format!("Generating {} flashcards", input.flashcard_count),
            ))
            .await;

        let start = Instant::now();
        let raw = self
            .generator
            .generate(
                FLASHCARD_SYSTEM_PROMPT,
                &flashcard_prompt(&input.topic, excerpt, input.flashcard_count),
            )
            .await?;
        metrics::histogram!("generation_stage_seconds", "stage" => "flashcards")
            .record(start.elapsed().as_secs_f64());

        let cards: Vec<Flashcard> = parse_generated_array(&raw, Vec::new(), "flashcards");
        let card_record = self
            .artifacts
            .store_flashcards(package_id, &input.user_id, &model, &cards)
            .await?;
        tracing::info!(
            job_id = %reporter.job_id(),
            card_count = card_record.card_count,
            "Flashcard stage complete"
        );

        // ── Stage 3: quiz ────────────────────────────────────────────────
        ensure_active(cancel)?;
        reporter
            .report(JobUpdate::new(
                JobStatus::GeneratingQuiz,
                PROGRESS_QUIZ,
                format!("Generating {} quiz questions", input.question_count),
            ))
            .await;

        let start = Instant::now();
        let raw = self
            .generator
            .generate(
                QUIZ_SYSTEM_PROMPT,
                &quiz_prompt(&input.topic, excerpt, input.question_count),
            )
            .await?;
        metrics::histogram!("generation_stage_seconds", "stage" => "quiz")
            .record(start.elapsed().as_secs_f64());

        let questions: Vec<QuizQuestion> = parse_generated_array(&raw, Vec::new(), "quiz");
        let quiz_record = self
            .artifacts
            .store_quiz(package_id, &input.user_id, &model, &questions)
            .await?;
        tracing::info!(
            job_id = %reporter.job_id(),
            question_count = quiz_record.question_count,
            "Quiz stage complete"
        );

        // ── Finalize ─────────────────────────────────────────────────────
        self.repo.mark_package_completed(package_id).await?;
        reporter
            .report(JobUpdate::completed(package_id.to_string()))
            .await;
        metrics::counter!("study_jobs_completed").increment(1);

        tracing::info!(
            job_id = %reporter.job_id(),
            package_id = %package_id,
            "Generation pipeline completed"
        );

        Ok(package_id)
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Char-boundary-safe bounded prefix of the extracted source text.
fn source_excerpt(content: &str) -> &str {
    match content.char_indices().nth(SOURCE_EXCERPT_MAX_CHARS) {
        Some((i, _)) => &content[..i],
        None => content,
    }
}

const SUMMARY_SYSTEM_PROMPT: &str = "You are an expert dental educator preparing \
candidates for licensing exams. Write clear, accurate study material in Markdown.";

const FLASHCARD_SYSTEM_PROMPT: &str = "You are an expert dental educator. Respond \
with ONLY a JSON array of flashcard objects, each with exactly two string fields: \
\"front\" and \"back\". No prose before or after the array.";

const QUIZ_SYSTEM_PROMPT: &str = "You are an expert dental educator. Respond with \
ONLY a JSON array of multiple-choice question objects with fields \"question\", \
\"options\" (array of 4 strings), \"answer\" (the correct option text), and \
\"explanation\". No prose before or after the array.";

fn summary_prompt(topic: &str, excerpt: Option<&str>) -> String {
    match excerpt {
        Some(source) => format!(
            "Write a structured Markdown study summary of the following course \
material on \"{topic}\". Cover key concepts, clinical relevance, and common \
exam pitfalls.\n\n---\n{source}"
        ),
        None => format!(
            "Write a structured Markdown study summary of the topic \"{topic}\" \
for a dental licensing exam candidate. Cover key concepts, clinical relevance, \
and common exam pitfalls."
        ),
    }
}

fn flashcard_prompt(topic: &str, excerpt: Option<&str>, count: u32) -> String {
    match excerpt {
        Some(source) => format!(
            "Create {count} flashcards on \"{topic}\" from the following course \
material.\n\n---\n{source}"
        ),
        None => format!("Create {count} flashcards on the dental topic \"{topic}\"."),
    }
}

fn quiz_prompt(topic: &str, excerpt: Option<&str>, count: u32) -> String {
    match excerpt {
        Some(source) => format!(
            "Create {count} exam-style multiple-choice questions on \"{topic}\" \
from the following course material.\n\n---\n{source}"
        ),
        None => format!(
            "Create {count} exam-style multiple-choice questions on the dental \
topic \"{topic}\"."
        ),
    }
}

/// Registry of cancellation tokens for in-flight jobs, keyed by job id.
#[derive(Default)]
pub struct ActiveJobs {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl ActiveJobs {
    /// Register a job and get its cancellation token.
    pub fn register(&self, job_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens
            .lock()
            .expect("active jobs lock poisoned")
            .insert(job_id.to_string(), token.clone());
        token
    }

    /// Cancel a running job. Returns false if the job is not in flight.
    pub fn cancel(&self, job_id: &str) -> bool {
        match self
            .tokens
            .lock()
            .expect("active jobs lock poisoned")
            .get(job_id)
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop a finished job's token.
    pub fn remove(&self, job_id: &str) {
        self.tokens
            .lock()
            .expect("active jobs lock poisoned")
            .remove(job_id);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Artifact persistence failed: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Database error: {0}")]
    Repo(#[from] RepoError),

    #[error("Job cancelled")]
    Cancelled,
}
