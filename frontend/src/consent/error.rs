use chrono::{DateTime, Utc};
use thiserror::Error;

/// Why a consent record could not be read or written.
///
/// Readers collapse every variant into "no consent"; only writers surface
/// the error so the visitor's click is not silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsentError {
    #[error("no consent record stored")]
    NotFound,
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("malformed consent record: {0}")]
    MalformedRecord(String),
    #[error("consent version mismatch (found {found:?}, expected {expected})")]
    VersionMismatch {
        found: Option<String>,
        expected: String,
    },
    #[error("consent issued at {issued_at} has expired")]
    Expired { issued_at: DateTime<Utc> },
    #[error("invalid consent configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to serialize consent record: {0}")]
    Serialize(String),
}

impl From<serde_json::Error> for ConsentError {
    fn from(e: serde_json::Error) -> Self {
        ConsentError::MalformedRecord(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConsentError>;
