use serde::{Deserialize, Serialize};
use strum::Display;

/// Status of a study material generation job, as seen by polling clients.
///
/// Transitions are strictly forward; `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Uploaded,
    Parsing,
    Summarizing,
    GeneratingFlashcards,
    GeneratingQuiz,
    Completed,
    Failed,
}

/// Immutable snapshot captured when a job is created.
///
/// Re-attached to every status write so each job record is self-describing
/// even if a reader missed earlier writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobMetadata {
    pub user_id: String,
    pub document_id: Option<String>,
    pub topic: String,
    pub topic_slug: String,
    pub flashcard_count: u32,
    pub question_count: u32,
    /// Storage key of the uploaded source file (upload path only).
    pub source_key: Option<String>,
}

/// The full record written to the job store on every status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub metadata: JobMetadata,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The delta carried by one status-reporter call.
#[derive(Debug, Clone)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub result_id: Option<String>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn new(status: JobStatus, progress: u8, message: impl Into<String>) -> Self {
        Self {
            status,
            progress,
            message: message.into(),
            result_id: None,
            error: None,
        }
    }

    pub fn completed(result_id: String) -> Self {
        Self {
            status: JobStatus::Completed,
            progress: 100,
            message: "Study material package ready".to_string(),
            result_id: Some(result_id),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            progress: 100,
            message: "Generation failed".to_string(),
            result_id: None,
            error: Some(error.into()),
        }
    }
}

/// Turn a topic into a URL-safe slug for storage keys and client URLs.
pub fn topic_slug(topic: &str) -> String {
    let mut slug = String::with_capacity(topic.len());
    let mut last_dash = true;
    for c in topic.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_screaming_snake() {
        let json = serde_json::to_string(&JobStatus::GeneratingFlashcards).unwrap();
        assert_eq!(json, "\"GENERATING_FLASHCARDS\"");
    }

    #[test]
    fn test_topic_slug() {
        assert_eq!(topic_slug("Endodontics"), "endodontics");
        assert_eq!(topic_slug("Oral & Maxillofacial Surgery"), "oral-maxillofacial-surgery");
        assert_eq!(topic_slug("  Perio 101!  "), "perio-101");
    }

    #[test]
    fn test_record_roundtrip_keeps_metadata() {
        let record = JobRecord {
            job_id: "job_42".to_string(),
            metadata: JobMetadata {
                user_id: "u1".to_string(),
                document_id: None,
                topic: "Endodontics".to_string(),
                topic_slug: "endodontics".to_string(),
                flashcard_count: 5,
                question_count: 5,
                source_key: None,
            },
            status: JobStatus::Summarizing,
            progress: 45,
            message: "Generating summary".to_string(),
            result_id: None,
            error: None,
        };

        let json = serde_json::to_string(&record).unwrap();
        let back: JobRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.metadata, record.metadata);
        assert_eq!(back.status, JobStatus::Summarizing);
    }
}
