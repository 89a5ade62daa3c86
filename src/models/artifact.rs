use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single flashcard as generated by the text model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

/// A single multiple-choice quiz question as generated by the text model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Metadata row for a generated summary. The markdown body lives in the
/// blob store at `blob_path`; `content_hash` is SHA-256 over the text,
/// base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub id: Uuid,
    pub package_id: Uuid,
    pub user_id: String,
    pub blob_path: String,
    pub model: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Metadata row for a generated flashcard set (JSON blob).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashcardSetRecord {
    pub id: Uuid,
    pub package_id: Uuid,
    pub user_id: String,
    pub blob_path: String,
    pub card_count: i32,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

/// Metadata row for a generated quiz question set (JSON blob).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSetRecord {
    pub id: Uuid,
    pub package_id: Uuid,
    pub user_id: String,
    pub blob_path: String,
    pub question_count: i32,
    pub model: String,
    pub created_at: DateTime<Utc>,
}
