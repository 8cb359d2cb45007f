//! Operator actions: manual retry, cancellation and recovery sweeps.

use std::sync::Arc;
use std::time::Duration;

use queue_core::{
    BackoffPolicy, Clock, Envelope, Job, JobEvent, JobFilter, JobId, JobPatch, JobStatus, Page,
    QueueConfig, later,
};
use queue_db::{JobStore, StoreError};

use crate::error::QueueError;
use crate::events::EventSink;
use crate::transport::Transport;

/// Error recorded on a cancelled job.
pub const CANCELLED: &str = "cancelled";

const CANCEL_ATTEMPTS: usize = 3;
const SWEEP_PAGE: usize = 100;

/// Administrative operations on existing jobs.
pub struct JobAdmin<S, T> {
    store: Arc<S>,
    transport: Arc<T>,
    clock: Arc<dyn Clock>,
    backoff: BackoffPolicy,
    processing_timeout: Duration,
    events: EventSink,
}

impl<S: JobStore, T: Transport> JobAdmin<S, T> {
    pub fn new(
        store: Arc<S>,
        transport: Arc<T>,
        clock: Arc<dyn Clock>,
        config: &QueueConfig,
    ) -> Self {
        Self {
            store,
            transport,
            clock,
            backoff: config.backoff(),
            processing_timeout: config.processing_timeout(),
            events: EventSink::disabled(),
        }
    }

    /// Set the event broadcaster.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Return a failed job with attempts left to pending and republish it.
    ///
    /// Returns `Ok(false)` when the job is not failed, has no attempts left,
    /// or changed concurrently. `attempts` is kept.
    pub async fn retry_job(&self, id: JobId) -> Result<bool, QueueError> {
        let job = self.store.get(id).await?.ok_or(QueueError::NotFound(id))?;

        if job.status != JobStatus::Failed || !job.has_attempts_left() {
            tracing::debug!(job_id = %id, status = %job.status, "Job not retryable");
            return Ok(false);
        }

        let now = self.clock.now();
        let patch = JobPatch::at(now).status(JobStatus::Pending);
        let Some(updated) = self
            .store
            .compare_and_update(id, job.revision(), &patch)
            .await?
        else {
            return Ok(false);
        };

        self.transport.publish(Envelope::for_job(&updated)).await?;

        tracing::info!(job_id = %id, attempts = updated.attempts, "Job manually retried");
        self.events.emit(JobEvent::JobRetrying {
            job_id: id,
            attempt: updated.attempts,
            delay_secs: 0,
            timestamp: now,
        });
        Ok(true)
    }

    /// Fail a pending or processing job with the error `cancelled`.
    ///
    /// Returns `Ok(false)` if the job does not exist or is already terminal,
    /// without modifying it. Envelopes still in flight are dropped by the
    /// consumer once they find the job terminal.
    pub async fn cancel_job(&self, id: JobId) -> Result<bool, StoreError> {
        for _ in 0..CANCEL_ATTEMPTS {
            let Some(job) = self.store.get(id).await? else {
                return Ok(false);
            };
            if job.status.is_terminal() {
                return Ok(false);
            }

            let now = self.clock.now();
            let patch = JobPatch::at(now)
                .status(JobStatus::Failed)
                .error(CANCELLED);

            match self.store.compare_and_update(id, job.revision(), &patch).await {
                Ok(Some(_)) => {
                    tracing::info!(job_id = %id, from = %job.status, "Job cancelled");
                    self.events.emit(JobEvent::JobCancelled {
                        job_id: id,
                        timestamp: now,
                    });
                    return Ok(true);
                }
                // A consumer moved the job; look again.
                Ok(None) => continue,
                Err(StoreError::NotFound(_)) => return Ok(false),
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(job_id = %id, "Cancel lost repeated races, giving up");
        Ok(false)
    }

    /// Publish a fresh envelope for every unfinished job untouched for `older_than`.
    ///
    /// Repairs pending jobs whose publish failed at enqueue, and jobs whose
    /// envelope died with a transport that does not survive restarts. Each
    /// envelope stays invisible until the job is due:
    ///
    /// - a pending job that failed before waits out the rest of its backoff,
    ///   measured from its last update;
    /// - a processing job waits until the processing timeout lets a consumer
    ///   reclaim it.
    ///
    /// Jobs that still have an envelope in flight receive a duplicate, which
    /// consumers tolerate. A pending job that was manually retried is
    /// indistinguishable from one in backoff and waits too.
    pub async fn republish_stale(&self, older_than: Duration) -> Result<usize, QueueError> {
        let cutoff = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| self.clock.now().checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            return Ok(0);
        };

        let mut stale = Vec::new();
        for status in [JobStatus::Pending, JobStatus::Processing] {
            let jobs = self.scan(status).await?;
            stale.extend(
                jobs.iter()
                    .filter(|j| j.updated_at <= cutoff)
                    .map(|j| self.recovery_envelope(j)),
            );
        }

        let count = stale.len();
        for envelope in stale {
            tracing::debug!(
                job_id = %envelope.job_id,
                visible_from = ?envelope.scheduled_for,
                "Republishing stale job"
            );
            self.transport.publish(envelope).await?;
        }

        if count > 0 {
            tracing::info!("Republished {} stale jobs", count);
        }
        Ok(count)
    }

    async fn scan(&self, status: JobStatus) -> Result<Vec<Job>, QueueError> {
        let filter = JobFilter::status(status);
        let mut page = Page::first(SWEEP_PAGE);
        let mut found = Vec::new();

        loop {
            let jobs = self.store.list(&filter, page).await?;
            let done = jobs.len() < page.limit;
            found.extend(jobs);
            if done {
                return Ok(found);
            }
            page = page.next();
        }
    }

    fn recovery_envelope(&self, job: &Job) -> Envelope {
        let envelope = Envelope::for_job(job);
        match job.status {
            JobStatus::Processing => {
                envelope.not_before(later(job.updated_at, self.processing_timeout))
            }
            JobStatus::Pending if job.attempts > 0 && job.error.is_some() => {
                envelope.not_before(later(job.updated_at, self.backoff.delay(job.attempts)))
            }
            _ => envelope,
        }
    }
}
