use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, BucketError>;

#[derive(Debug, Error)]
pub enum BucketError {
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("invalid cell identifier: {0}")]
    InvalidCell(String),

    #[error("unresolvable location name: {0:?}")]
    UnresolvableName(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub operation: String,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl BucketError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCoordinate(_) => "INVALID_COORDINATE",
            Self::InvalidCell(_) => "INVALID_CELL",
            Self::UnresolvableName(_) => "UNRESOLVABLE_NAME",
            Self::Validation(_) => "VALIDATION_FAILED",
            // SQLite failures surface as store unavailability; retry policy
            // belongs to the caller.
            Self::StoreUnavailable(_) | Self::Sqlite(_) => "STORE_UNAVAILABLE",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    pub(crate) fn lock_poisoned(what: &str) -> Self {
        Self::StoreUnavailable(format!("{what} lock poisoned"))
    }

    pub fn to_payload(&self, operation: impl Into<String>) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            message: self.to_string(),
            operation: operation.into(),
            trace_id: Uuid::new_v4().to_string(),
            details: None,
        }
    }
}
