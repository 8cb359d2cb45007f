//! Job domain types for work items in the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::ValidationError;

/// Default upper bound on processing attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current status of a job in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job is waiting to be processed.
    #[default]
    Pending,
    /// A consumer has claimed the job and is running its handler.
    Processing,
    /// Job completed successfully.
    Completed,
    /// Job failed terminally (exhausted, rejected or cancelled).
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal lifecycle transition.
    ///
    /// `processing -> processing` is the reclaim of a job whose consumer vanished.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Pending)
                | (Processing, Failed)
                | (Pending, Failed)
                | (Failed, Pending)
        )
    }

    /// Get a simple status string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied knobs for [`Job::new`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// Informational priority, carried to the transport.
    pub priority: Option<i32>,
    /// Upper bound on attempts; falls back to the queue default.
    pub max_attempts: Option<u32>,
    /// Earliest time the job may be processed.
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl JobOptions {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }
}

/// A job represents a unit of work to be executed by the queue system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Type of job (used for routing to handlers).
    pub job_type: String,
    /// Job payload as JSON.
    pub payload: serde_json::Value,
    /// Current status.
    pub status: JobStatus,
    /// Informational priority.
    pub priority: i32,
    /// Number of processing attempts started so far.
    #[serde(default)]
    pub attempts: u32,
    /// Upper bound on `attempts`.
    pub max_attempts: u32,
    /// Handler output, set on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Most recent failure message. Never cleared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The job is not eligible before this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the job entered `completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job stamped with `now`.
    pub fn new(
        job_type: impl Into<String>,
        payload: serde_json::Value,
        options: &JobOptions,
        default_max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            payload,
            status: JobStatus::Pending,
            priority: options.priority.unwrap_or(0),
            attempts: 0,
            max_attempts: options.max_attempts.unwrap_or(default_max_attempts),
            result: None,
            error: None,
            scheduled_for: options.scheduled_for,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Check the fields a consumer needs before it may claim the job.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.job_type.trim().is_empty() {
            return Err(ValidationError::EmptyJobType);
        }
        if self.payload.is_null() {
            return Err(ValidationError::MissingPayload);
        }
        if self.attempts >= self.max_attempts {
            return Err(ValidationError::AttemptsExhausted {
                attempts: self.attempts,
                max_attempts: self.max_attempts,
            });
        }
        Ok(())
    }

    /// True while `scheduled_for` lies in the future.
    pub fn is_deferred(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_for.is_some_and(|at| at > now)
    }

    /// Whether another attempt may still be started.
    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// The revision a compare-and-swap against this snapshot expects.
    pub fn revision(&self) -> Revision {
        Revision {
            status: self.status,
            attempts: self.attempts,
        }
    }

    /// Apply a patch in place, the way a document store merges it.
    pub fn apply(&mut self, patch: &JobPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(attempts) = patch.attempts {
            self.attempts = attempts;
        }
        if let Some(result) = &patch.result {
            self.result = Some(result.clone());
        }
        if let Some(error) = &patch.error {
            self.error = Some(error.clone());
        }
        if let Some(completed_at) = patch.completed_at {
            self.completed_at = Some(completed_at);
        }
        self.updated_at = patch.updated_at;
    }
}

/// The (status, attempts) pair a conditional update is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub status: JobStatus,
    pub attempts: u32,
}

/// Partial field update merged into a stored job.
///
/// Fields left `None` are untouched; `updated_at` is always written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl JobPatch {
    /// An empty patch stamped with `now`.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            status: None,
            attempts: None,
            result: None,
            error: None,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }
}

/// Filter options for listing jobs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<String>,
}

impl JobFilter {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn job_type(mut self, job_type: impl Into<String>) -> Self {
        self.job_type = Some(job_type.into());
        self
    }

    /// Whether `job` passes this filter.
    pub fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|s| job.status == s)
            && self.job_type.as_deref().is_none_or(|t| job.job_type == t)
    }
}

/// Limit/offset pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    pub fn first(limit: usize) -> Self {
        Self::new(limit, 0)
    }

    /// The page after this one.
    pub fn next(self) -> Self {
        Self::new(self.limit, self.offset + self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(max_attempts: u32) -> Job {
        let options = JobOptions::default().with_max_attempts(max_attempts);
        Job::new("send-email", json!({"to": "a@b.com"}), &options, 3, Utc::now())
    }

    #[test]
    fn new_job_defaults() {
        let job = Job::new("echo", json!({}), &JobOptions::default(), 3, Utc::now());
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, 3);
        assert_eq!(job.priority, 0);
        assert_eq!(job.created_at, job.updated_at);
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn pending_never_jumps_to_completed() {
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Pending));
        assert!(JobStatus::Failed.can_transition_to(JobStatus::Pending));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn validate_rejects_exhausted_and_empty() {
        let mut exhausted = job(2);
        exhausted.attempts = 2;
        assert_eq!(
            exhausted.validate(),
            Err(ValidationError::AttemptsExhausted {
                attempts: 2,
                max_attempts: 2
            })
        );

        let mut untyped = job(3);
        untyped.job_type = "  ".into();
        assert_eq!(untyped.validate(), Err(ValidationError::EmptyJobType));

        let mut empty = job(3);
        empty.payload = serde_json::Value::Null;
        assert_eq!(empty.validate(), Err(ValidationError::MissingPayload));

        assert!(job(3).validate().is_ok());
    }

    #[test]
    fn apply_keeps_error_trail() {
        let mut job = job(3);
        let later = job.created_at + chrono::Duration::seconds(5);
        job.apply(&JobPatch::at(later).status(JobStatus::Pending).error("boom"));
        job.apply(
            &JobPatch::at(later)
                .status(JobStatus::Completed)
                .result(json!({"ok": true}))
                .completed_at(later),
        );
        assert_eq!(job.error.as_deref(), Some("boom"));
        assert_eq!(job.result, Some(json!({"ok": true})));
        assert_eq!(job.updated_at, later);
    }

    #[test]
    fn filter_matches_status_and_type() {
        let job = job(3);
        assert!(JobFilter::default().matches(&job));
        assert!(JobFilter::status(JobStatus::Pending).matches(&job));
        assert!(!JobFilter::status(JobStatus::Failed).matches(&job));
        assert!(!JobFilter::default().job_type("crawl").matches(&job));
    }
}
