//! Lifecycle events for observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId};

/// Events emitted as jobs move through their lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A new job was persisted and published.
    JobEnqueued { job: Job, timestamp: DateTime<Utc> },
    /// A consumer claimed the job and is invoking its handler.
    JobStarted {
        job_id: JobId,
        job_type: String,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    /// The handler succeeded.
    JobCompleted {
        job_id: JobId,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// The handler failed.
    JobFailed {
        job_id: JobId,
        error: String,
        attempts: u32,
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },
    /// The job was returned to pending and will be redelivered.
    JobRetrying {
        job_id: JobId,
        attempt: u32,
        delay_secs: u64,
        timestamp: DateTime<Utc>,
    },
    /// The job failed validation and was failed without running.
    JobRejected {
        job_id: JobId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// The job was cancelled.
    JobCancelled {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the job ID associated with this event.
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::JobEnqueued { job, .. } => job.id,
            JobEvent::JobStarted { job_id, .. }
            | JobEvent::JobCompleted { job_id, .. }
            | JobEvent::JobFailed { job_id, .. }
            | JobEvent::JobRetrying { job_id, .. }
            | JobEvent::JobRejected { job_id, .. }
            | JobEvent::JobCancelled { job_id, .. } => *job_id,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobEnqueued { job, .. } => {
                format!("Job {} ({}) enqueued", job.id, job.job_type)
            }
            JobEvent::JobStarted {
                job_id, attempt, ..
            } => format!("Job {} started (attempt {})", job_id, attempt),
            JobEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} completed in {}ms", job_id, duration_ms),
            JobEvent::JobFailed {
                job_id,
                error,
                will_retry,
                ..
            } => {
                let retry = if *will_retry { " (will retry)" } else { "" };
                format!("Job {} failed: {}{}", job_id, error, retry)
            }
            JobEvent::JobRetrying {
                job_id,
                attempt,
                delay_secs,
                ..
            } => format!(
                "Job {} retrying after attempt {} in {}s",
                job_id, attempt, delay_secs
            ),
            JobEvent::JobRejected { job_id, reason, .. } => {
                format!("Job {} rejected: {}", job_id, reason)
            }
            JobEvent::JobCancelled { job_id, .. } => format!("Job {} cancelled", job_id),
        }
    }
}
