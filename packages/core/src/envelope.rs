//! Delivery envelope carried by a transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId};

/// One delivery of a job, as handed to and from the transport.
///
/// The payload is a denormalized copy; the stored job stays authoritative,
/// including for `attempts`. `retry_attempt` is advisory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub job_id: JobId,
    pub job_type: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub retry_attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl Envelope {
    /// Envelope for a job's next delivery.
    pub fn for_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type.clone(),
            payload: job.payload.clone(),
            priority: job.priority,
            retry_attempt: job.attempts,
            scheduled_for: job.scheduled_for,
        }
    }

    /// Keep the envelope invisible until at least `at`.
    pub fn not_before(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(self.scheduled_for.map_or(at, |s| s.max(at)));
        self
    }
}
