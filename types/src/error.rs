//! Error taxonomy shared by every layer.

use thiserror::Error;

use crate::QuizId;

/// Input rejected before any store call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("reflection text must not be empty")]
    EmptyReflection,
    #[error("quiz {quiz} has no selected option")]
    MissingSelection { quiz: QuizId },
    #[error("quiz {quiz} is not part of this lesson")]
    UnknownQuiz { quiz: QuizId },
    #[error("option {option} is out of range for quiz {quiz} ({options} options)")]
    OptionOutOfRange {
        quiz: QuizId,
        option: usize,
        options: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LessonError {
    #[error("device identity unavailable: {0}")]
    IdentityUnavailable(String),
    #[error("local storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    PreconditionViolation(&'static str),
}

impl LessonError {
    /// Whether re-triggering the same action may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::StorageUnavailable(_))
    }
}

/// User-visible message raised by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: &'static str,
    pub message: String,
    pub retryable: bool,
    /// A stored quiz result can be resent with an explicit sync retry.
    pub sync_retry: bool,
}

impl Notice {
    #[must_use]
    pub fn submission_failed(what: &str, error: &LessonError) -> Self {
        Self {
            title: "Submission Error",
            message: format!("Failed to submit {what}: {error}"),
            retryable: error.is_retryable(),
            sync_retry: false,
        }
    }

    /// The quiz result was scored locally but not written to the ledger.
    #[must_use]
    pub fn quiz_sync_failed(error: &LessonError) -> Self {
        let retryable = error.is_retryable();
        Self {
            sync_retry: retryable,
            ..Self::submission_failed("quiz results", error)
        }
    }

    /// The reflection is on its record but the community feed did not take it.
    #[must_use]
    pub fn reflection_unpublished(error: &LessonError) -> Self {
        Self {
            title: "Community Feed",
            message: format!("Your reflection was saved but could not be shared: {error}"),
            retryable: false,
            sync_retry: false,
        }
    }
}
