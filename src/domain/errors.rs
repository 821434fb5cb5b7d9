//! Domain errors for the adaptive weight learning loop.

use thiserror::Error;

/// Errors that can occur while learning, validating or rolling back weights.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LearningError {
    #[error("Document store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("{kind} not found: {key}")]
    RecordNotFound { kind: String, key: String },

    #[error("Concurrent update conflict on {key}: expected version {expected:?}, found {actual:?}")]
    ConcurrentUpdateConflict {
        key: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    #[error("Insufficient data for statistical test: need {required} samples, have {actual}")]
    StatisticalInsufficientData { required: usize, actual: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LearningError {
    /// Short, stable name used as a telemetry tag.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::CacheUnavailable(_) => "cache_unavailable",
            Self::RecordNotFound { .. } => "record_not_found",
            Self::ConcurrentUpdateConflict { .. } => "concurrent_update_conflict",
            Self::StatisticalInsufficientData { .. } => "statistical_insufficient_data",
            Self::InvalidInput(_) => "invalid_input",
            Self::Serialization(_) => "serialization",
        }
    }

    pub fn not_found(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self::RecordNotFound {
            kind: kind.into(),
            key: key.into(),
        }
    }

    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrentUpdateConflict { .. })
    }
}

pub type LearningResult<T> = Result<T, LearningError>;

impl From<serde_json::Error> for LearningError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
