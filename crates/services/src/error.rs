//! Shared error types for the services crate.

use thiserror::Error;

use persona_core::model::{
    AnswerId, AssessmentError, AssessmentId, ProgressError, QuestionId, ResultError,
};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

use crate::sessions::SessionState;

/// Errors emitted by session services.
///
/// Every variant except `ResultNotPersisted` is a contract violation by the
/// caller. Store failures never appear here; they are absorbed at the
/// adapter boundary and only surface as `ResultNotPersisted` during finalize.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("access denied for assessment {0}")]
    AccessDenied(AssessmentId),
    #[error("unknown assessment: {0}")]
    UnknownAssessment(AssessmentId),
    #[error("cannot {action} while session is {state}")]
    InvalidTransition {
        action: &'static str,
        state: SessionState,
    },
    #[error("only {answered} of {total} questions answered")]
    Incomplete { answered: usize, total: u32 },
    #[error("expected an answer for question {expected}, got {got}")]
    UnexpectedQuestion { expected: QuestionId, got: QuestionId },
    #[error("answer {answer} does not belong to question {question}")]
    UnknownAnswer {
        question: QuestionId,
        answer: AnswerId,
    },
    #[error("result could not be persisted; finalize may be retried")]
    ResultNotPersisted,
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Result(#[from] ResultError),
}

impl SessionError {
    /// True for errors caused by misuse of the session API rather than the backend.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        !matches!(self, SessionError::ResultNotPersisted)
    }
}

/// Errors emitted while loading the assessment catalog.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("duplicate assessment id: {0}")]
    DuplicateAssessment(AssessmentId),
    #[error(transparent)]
    Assessment(#[from] AssessmentError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
