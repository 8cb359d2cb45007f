//! Error taxonomy for job processing.

use thiserror::Error;

use crate::JobId;

/// Why a job cannot be processed. Terminal: the job is failed without a retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("job type is empty")]
    EmptyJobType,
    #[error("job payload is missing")]
    MissingPayload,
    #[error("max attempts exceeded ({attempts}/{max_attempts})")]
    AttemptsExhausted { attempts: u32, max_attempts: u32 },
    #[error("unknown job type")]
    UnknownJobType(String),
    #[error("max attempts must be at least 1")]
    InvalidMaxAttempts,
}

/// Job-level failure outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("handler failed: {0}")]
    Handler(String),
    #[error("max retries exceeded after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },
}
