//! Aggregate counts over job state.

use serde::{Deserialize, Serialize};

use crate::JobStatus;

/// Point-in-time job counts by status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobStats {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    /// Completed share of all jobs, as a percentage.
    pub completion_rate: f64,
    /// Failed share of all jobs, as a percentage.
    pub failure_rate: f64,
}

impl JobStats {
    /// Count one job with the given status.
    pub fn record(&mut self, status: JobStatus) {
        self.total += 1;
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Processing => self.processing += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }

    /// Recompute the rates from the counts.
    pub fn finish(mut self) -> Self {
        self.completion_rate = percentage(self.completed, self.total);
        self.failure_rate = percentage(self.failed, self.total);
        self
    }

    /// Jobs not yet terminal (pending + processing).
    pub fn active(&self) -> u64 {
        self.pending + self.processing
    }

    /// Terminal jobs.
    pub fn processed(&self) -> u64 {
        self.completed + self.failed
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}
