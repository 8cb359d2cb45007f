//! Queue-wide tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{BackoffPolicy, DEFAULT_MAX_ATTEMPTS};

/// Configuration for queue behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Max attempts for jobs enqueued without an explicit value.
    pub default_max_attempts: u32,
    /// Backoff base delay (seconds).
    pub backoff_base_secs: u64,
    /// Backoff ceiling (seconds).
    pub backoff_max_secs: u64,
    /// Envelopes pulled per poll.
    pub batch_size: usize,
    /// Page size used when scanning the store for stats.
    pub stats_page_size: usize,
    /// Age after which a `processing` job may be reclaimed by a redelivery.
    pub processing_timeout_secs: u64,
    /// Optional deadline wrapped around each handler call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler_timeout_secs: Option<u64>,
    /// Lease on an un-acked delivery before the in-memory transport redelivers it.
    pub visibility_timeout_secs: u64,
    /// Sleep between polls that returned nothing.
    pub poll_interval_ms: u64,
    /// Number of consumer actors.
    pub concurrency: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_secs: 60,
            backoff_max_secs: 3600,
            batch_size: 10,
            stats_page_size: 10_000,
            processing_timeout_secs: 900,
            handler_timeout_secs: None,
            visibility_timeout_secs: 300,
            poll_interval_ms: 500,
            concurrency: 2,
        }
    }
}

impl QueueConfig {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::from_secs(self.backoff_base_secs, self.backoff_max_secs)
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_secs.map(Duration::from_secs)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Set the handler deadline.
    pub fn with_handler_timeout(mut self, secs: u64) -> Self {
        self.handler_timeout_secs = Some(secs);
        self
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the number of consumer actors.
    pub fn with_concurrency(mut self, concurrency: u32) -> Self {
        self.concurrency = concurrency;
        self
    }
}
