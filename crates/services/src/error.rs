//! Shared error taxonomy for the services crate.
//!
//! Every use-case operation surfaces one of four codes; storage and domain
//! errors are mapped here once so callers never see backend details.

use thiserror::Error;

use qbank_core::model::{QuestionError, SessionStateError};
use storage::repository::StorageError;

/// Use-case error taxonomy.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Question, choice, or session absent — or not owned by the caller.
    #[error("not found")]
    NotFound,

    /// The operation is not valid in the current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed input: filters, counts, keys.
    #[error("validation error: {0}")]
    Validation(String),

    /// Invariant violations, exhausted CAS retries, and wrapped storage
    /// failures. The message is safe to surface; the cause is logged.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable wire code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound => "NOT_FOUND",
            EngineError::Conflict(_) => "CONFLICT",
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Human-readable detail without the code prefix.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            EngineError::NotFound => "not found".to_string(),
            EngineError::Conflict(m) | EngineError::Validation(m) | EngineError::Internal(m) => {
                m.clone()
            }
        }
    }

    /// Rebuild an error from its stored `(code, detail)` pair. Used when an
    /// idempotency record replays a failed outcome.
    #[must_use]
    pub fn from_code(code: &str, detail: String) -> Self {
        match code {
            "NOT_FOUND" => EngineError::NotFound,
            "CONFLICT" => EngineError::Conflict(detail),
            "VALIDATION_ERROR" => EngineError::Validation(detail),
            _ => EngineError::Internal(detail),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => EngineError::NotFound,
            StorageError::Conflict => EngineError::Conflict("storage conflict".to_string()),
            StorageError::Connection(cause) | StorageError::Serialization(cause) => {
                tracing::error!(%cause, "storage failure");
                EngineError::Internal("storage failure".to_string())
            }
            _ => EngineError::Internal("storage failure".to_string()),
        }
    }
}

impl From<SessionStateError> for EngineError {
    fn from(e: SessionStateError) -> Self {
        match e {
            SessionStateError::AlreadyEnded => {
                EngineError::Conflict("session already ended".to_string())
            }
            SessionStateError::UnknownQuestion { .. } => EngineError::NotFound,
            other => EngineError::Internal(other.to_string()),
        }
    }
}

impl From<QuestionError> for EngineError {
    fn from(e: QuestionError) -> Self {
        EngineError::Internal(e.to_string())
    }
}
