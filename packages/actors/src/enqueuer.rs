//! Job creation: persist, then publish.

use std::sync::Arc;

use queue_core::{Clock, Envelope, Job, JobEvent, JobId, JobOptions, ValidationError};
use queue_db::JobStore;

use crate::error::EnqueueError;
use crate::events::EventSink;
use crate::transport::Transport;

/// Creates pending jobs and publishes their first envelope.
pub struct Enqueuer<S, T> {
    store: Arc<S>,
    transport: Arc<T>,
    clock: Arc<dyn Clock>,
    default_max_attempts: u32,
    events: EventSink,
}

impl<S: JobStore, T: Transport> Enqueuer<S, T> {
    pub fn new(
        store: Arc<S>,
        transport: Arc<T>,
        clock: Arc<dyn Clock>,
        default_max_attempts: u32,
        events: EventSink,
    ) -> Self {
        Self {
            store,
            transport,
            clock,
            default_max_attempts,
            events,
        }
    }

    /// Persist a new pending job and publish its envelope.
    ///
    /// The job is stored before anything is published. If publishing fails
    /// the job stays pending with no envelope and the error carries its id.
    pub async fn enqueue(
        &self,
        job_type: impl Into<String>,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> Result<JobId, EnqueueError> {
        let job = Job::new(
            job_type,
            payload,
            &options,
            self.default_max_attempts,
            self.clock.now(),
        );

        if job.max_attempts == 0 {
            return Err(ValidationError::InvalidMaxAttempts.into());
        }
        if job.job_type.trim().is_empty() {
            return Err(ValidationError::EmptyJobType.into());
        }

        self.store.create(&job).await?;

        if let Err(source) = self.transport.publish(Envelope::for_job(&job)).await {
            tracing::warn!(
                job_id = %job.id,
                job_type = %job.job_type,
                "Job persisted but publish failed: {}",
                source
            );
            return Err(EnqueueError::Publish {
                job_id: job.id,
                source,
            });
        }

        tracing::debug!(job_id = %job.id, job_type = %job.job_type, "Job enqueued");
        let job_id = job.id;
        self.events.emit(JobEvent::JobEnqueued {
            timestamp: job.created_at,
            job,
        });

        Ok(job_id)
    }
}
