//! Caller-visible engine errors.
//!
//! Every variant rejects a turn before any state mutation. Advisor failures
//! are deliberately absent: they degrade to the deterministic fallback and
//! never surface to the caller.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("question not found: {0}")]
    QuestionNotFound(String),

    #[error("question already answered: {0}")]
    DuplicateResponse(String),

    #[error("assessment is paused")]
    AssessmentPaused,

    #[error("assessment already completed")]
    AssessmentAlreadyCompleted,
}
