use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Where the source content for a package came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SourceType {
    /// Generated from a topic alone.
    Ai,
    /// Generated from an uploaded document.
    Pdf,
}

/// Lifecycle status of a package row.
///
/// A package that never reaches `Completed` is a partial record left behind
/// by a failed run. It is kept as diagnostic evidence and must not be served
/// to display consumers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PackageStatus {
    Generating,
    Completed,
}

/// The durable record for one generation run and its artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: Uuid,
    pub user_id: String,
    pub topic: String,
    pub topic_slug: String,
    pub source_type: SourceType,
    pub source_path: Option<String>,
    pub status: PackageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_db_roundtrip() {
        assert_eq!(PackageStatus::Generating.to_string(), "generating");
        assert_eq!(
            PackageStatus::from_str("completed").unwrap(),
            PackageStatus::Completed
        );
    }

    #[test]
    fn test_source_type_db_roundtrip() {
        assert_eq!(SourceType::Pdf.to_string(), "pdf");
        assert_eq!(SourceType::from_str("ai").unwrap(), SourceType::Ai);
    }
}
