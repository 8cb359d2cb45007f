//! Delivery processing: the job lifecycle state machine.
//!
//! For each delivery the consumer loads the stored job, checks that it is
//! eligible, claims it with a compare-and-swap that bumps `attempts`, runs
//! the handler and records the outcome. Handler failures become state
//! transitions; store and transport failures leave the delivery unacked so
//! the transport redelivers it.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use futures_util::future::join_all;
use queue_core::{
    BackoffPolicy, Clock, Envelope, Job, JobError, JobEvent, JobId, JobPatch, JobStatus,
    QueueConfig, ValidationError, later,
};
use queue_db::JobStore;
use serde::Serialize;

use crate::error::ConsumerError;
use crate::events::EventSink;
use crate::handler::{HandlerRegistry, HandlerResult, JobHandler};
use crate::transport::{Delivery, Transport, TransportError};

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Handler succeeded; job completed; acked.
    Completed,
    /// Handler failed with attempts left; job pending; redelivery scheduled.
    Retrying { delay: Duration },
    /// Handler failed on the last attempt; job failed; acked.
    Failed,
    /// Job was not processable; failed without running; acked.
    Rejected,
    /// No such job; acked.
    Dropped,
    /// Job already moved on (duplicate delivery, lost race, cancelled); acked.
    Stale,
    /// Job not yet eligible; redelivery scheduled without an attempt.
    Deferred { delay: Duration },
}

/// Tally of one or more processed batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub received: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
    pub rejected: usize,
    pub dropped: usize,
    pub stale: usize,
    pub deferred: usize,
    /// Deliveries left unacked because of an infrastructure error.
    pub errors: usize,
}

impl BatchReport {
    fn record(&mut self, result: Result<Outcome, ConsumerError>) {
        match result {
            Ok(Outcome::Completed) => self.completed += 1,
            Ok(Outcome::Retrying { .. }) => self.retried += 1,
            Ok(Outcome::Failed) => self.failed += 1,
            Ok(Outcome::Rejected) => self.rejected += 1,
            Ok(Outcome::Dropped) => self.dropped += 1,
            Ok(Outcome::Stale) => self.stale += 1,
            Ok(Outcome::Deferred { .. }) => self.deferred += 1,
            Err(e) => {
                tracing::warn!("Delivery left unacked: {}", e);
                self.errors += 1;
            }
        }
    }

    /// Add another report's counts to this one.
    pub fn merge(&mut self, other: &BatchReport) {
        self.received += other.received;
        self.completed += other.completed;
        self.retried += other.retried;
        self.failed += other.failed;
        self.rejected += other.rejected;
        self.dropped += other.dropped;
        self.stale += other.stale;
        self.deferred += other.deferred;
        self.errors += other.errors;
    }
}

/// Pulls batches from the transport and drives each job through its lifecycle.
pub struct Consumer<S, T> {
    store: Arc<S>,
    transport: Arc<T>,
    handlers: Arc<HandlerRegistry>,
    clock: Arc<dyn Clock>,
    backoff: BackoffPolicy,
    batch_size: usize,
    processing_timeout: Duration,
    handler_timeout: Option<Duration>,
    events: EventSink,
}

impl<S: JobStore, T: Transport> Consumer<S, T> {
    pub fn new(
        store: Arc<S>,
        transport: Arc<T>,
        handlers: Arc<HandlerRegistry>,
        clock: Arc<dyn Clock>,
        config: &QueueConfig,
    ) -> Self {
        Self {
            store,
            transport,
            handlers,
            clock,
            backoff: config.backoff(),
            batch_size: config.batch_size.max(1),
            processing_timeout: config.processing_timeout(),
            handler_timeout: config.handler_timeout(),
            events: EventSink::disabled(),
        }
    }

    /// Set the event broadcaster.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Receive one batch and process it.
    pub async fn poll_once(&self) -> Result<BatchReport, ConsumerError> {
        let deliveries = self.transport.receive(self.batch_size).await?;
        if deliveries.is_empty() {
            return Ok(BatchReport::default());
        }
        Ok(self.process_batch(deliveries).await)
    }

    /// Process a batch of deliveries.
    ///
    /// Deliveries for the same job run one after another in batch order;
    /// different jobs run concurrently.
    pub async fn process_batch(&self, deliveries: Vec<Delivery>) -> BatchReport {
        let received = deliveries.len();

        let mut groups: Vec<Vec<Delivery>> = Vec::new();
        let mut index: HashMap<JobId, usize> = HashMap::new();
        for delivery in deliveries {
            let slot = *index.entry(delivery.envelope.job_id).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(delivery);
        }

        let results = join_all(groups.iter().map(|group| async move {
            let mut results = Vec::with_capacity(group.len());
            for delivery in group {
                results.push(self.process_delivery(delivery).await);
            }
            results
        }))
        .await;

        let mut report = BatchReport {
            received,
            ..Default::default()
        };
        for result in results.into_iter().flatten() {
            report.record(result);
        }
        report
    }

    /// Process a single delivery end to end.
    pub async fn process_delivery(&self, delivery: &Delivery) -> Result<Outcome, ConsumerError> {
        let job_id = delivery.envelope.job_id;

        let Some(job) = self.store.get(job_id).await? else {
            tracing::warn!(%job_id, "Job not found, dropping envelope");
            self.transport.ack(delivery).await?;
            return Ok(Outcome::Dropped);
        };

        let now = self.clock.now();

        match job.status {
            JobStatus::Completed | JobStatus::Failed => {
                tracing::debug!(%job_id, status = %job.status, "Job already terminal, acking duplicate");
                self.transport.ack(delivery).await?;
                return Ok(Outcome::Stale);
            }
            JobStatus::Processing => {
                let age = (now - job.updated_at).to_std().unwrap_or_default();
                if age < self.processing_timeout {
                    let delay = self.processing_timeout - age;
                    tracing::debug!(%job_id, "Job is being processed elsewhere, deferring");
                    self.transport.retry(delivery, Some(delay)).await?;
                    return Ok(Outcome::Deferred { delay });
                }
                tracing::warn!(
                    %job_id,
                    attempts = job.attempts,
                    "Reclaiming job stuck in processing"
                );
            }
            JobStatus::Pending => {}
        }

        if let Some(at) = job.scheduled_for.filter(|_| job.is_deferred(now)) {
            let delay = (at - now).to_std().unwrap_or_default();
            tracing::debug!(%job_id, "Job scheduled for later, deferring");
            self.transport.retry(delivery, Some(delay)).await?;
            return Ok(Outcome::Deferred { delay });
        }

        let handler = match self.resolve(&job) {
            Ok(handler) => handler,
            Err(reason) => return self.reject(delivery, &job, reason).await,
        };

        let attempts = job.attempts + 1;
        let claim = JobPatch::at(now)
            .status(JobStatus::Processing)
            .attempts(attempts);
        let Some(claimed) = self
            .store
            .compare_and_update(job_id, job.revision(), &claim)
            .await?
        else {
            tracing::debug!(%job_id, "Lost claim race, acking duplicate");
            self.transport.ack(delivery).await?;
            return Ok(Outcome::Stale);
        };

        self.events.emit(JobEvent::JobStarted {
            job_id,
            job_type: claimed.job_type.clone(),
            attempt: attempts,
            timestamp: now,
        });

        let started = Instant::now();
        let result = self.invoke(handler, claimed.payload.clone()).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        self.finish(delivery, &claimed, result, duration_ms).await
    }

    /// Validate the job and find its handler.
    fn resolve(&self, job: &Job) -> Result<Arc<dyn JobHandler>, ValidationError> {
        job.validate()?;
        self.handlers
            .lookup(&job.job_type)
            .ok_or_else(|| ValidationError::UnknownJobType(job.job_type.clone()))
    }

    /// Fail a job that can never run, without consuming an attempt.
    async fn reject(
        &self,
        delivery: &Delivery,
        job: &Job,
        reason: ValidationError,
    ) -> Result<Outcome, ConsumerError> {
        let failure = JobError::from(reason);
        let reason = failure.to_string();
        let now = self.clock.now();
        let patch = JobPatch::at(now)
            .status(JobStatus::Failed)
            .error(reason.clone());

        let updated = self
            .store
            .compare_and_update(job.id, job.revision(), &patch)
            .await?;
        self.transport.ack(delivery).await?;

        if updated.is_none() {
            tracing::debug!(job_id = %job.id, "Job changed before rejection, acking duplicate");
            return Ok(Outcome::Stale);
        }

        tracing::warn!(job_id = %job.id, job_type = %job.job_type, "Job rejected: {}", failure);
        self.events.emit(JobEvent::JobRejected {
            job_id: job.id,
            reason,
            timestamp: now,
        });
        Ok(Outcome::Rejected)
    }

    /// Run the handler, turning panics and deadline expiry into failures.
    async fn invoke(&self, handler: Arc<dyn JobHandler>, payload: serde_json::Value) -> HandlerResult {
        let call = AssertUnwindSafe(handler.handle(payload)).catch_unwind();

        let outcome = match self.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => return Err("job timed out".into()),
            },
            None => call.await,
        };

        outcome.unwrap_or_else(|_| Err("handler panicked".into()))
    }

    /// Record the handler's outcome against the claimed revision.
    async fn finish(
        &self,
        delivery: &Delivery,
        claimed: &Job,
        result: HandlerResult,
        duration_ms: u64,
    ) -> Result<Outcome, ConsumerError> {
        let job_id = claimed.id;
        let attempts = claimed.attempts;
        let now = self.clock.now();

        let (patch, will_retry, error) = match result {
            Ok(value) => (
                JobPatch::at(now)
                    .status(JobStatus::Completed)
                    .result(value)
                    .completed_at(now),
                false,
                None,
            ),
            Err(message) => {
                let will_retry = attempts < claimed.max_attempts;
                let status = if will_retry {
                    JobStatus::Pending
                } else {
                    JobStatus::Failed
                };
                (
                    JobPatch::at(now).status(status).error(message.clone()),
                    will_retry,
                    Some(message),
                )
            }
        };

        let Some(updated) = self
            .store
            .compare_and_update(job_id, claimed.revision(), &patch)
            .await?
        else {
            tracing::warn!(%job_id, "Job changed while its handler ran, discarding outcome");
            self.settle(delivery).await?;
            return Ok(Outcome::Stale);
        };

        let Some(error) = error else {
            self.settle(delivery).await?;
            tracing::info!(%job_id, attempts, duration_ms, "Job completed");
            self.events.emit(JobEvent::JobCompleted {
                job_id,
                duration_ms,
                timestamp: now,
            });
            return Ok(Outcome::Completed);
        };

        self.events.emit(JobEvent::JobFailed {
            job_id,
            error: error.clone(),
            attempts,
            will_retry,
            timestamp: now,
        });

        if will_retry {
            let delay = self.backoff.delay(attempts);
            self.reschedule(delivery, &updated, delay).await?;
            tracing::info!(
                %job_id,
                attempts,
                delay_secs = delay.as_secs(),
                "{}, retrying",
                JobError::Handler(error)
            );
            self.events.emit(JobEvent::JobRetrying {
                job_id,
                attempt: attempts,
                delay_secs: delay.as_secs(),
                timestamp: now,
            });
            Ok(Outcome::Retrying { delay })
        } else {
            self.settle(delivery).await?;
            tracing::warn!(%job_id, last_error = %error, "{}", JobError::MaxRetriesExceeded { attempts });
            Ok(Outcome::Failed)
        }
    }

    /// Ack a delivery whose outcome is already in the store.
    ///
    /// If the lease ran out while the handler ran, the transport has handed
    /// the envelope out again and that copy will find the job moved on.
    async fn settle(&self, delivery: &Delivery) -> Result<(), ConsumerError> {
        match self.transport.ack(delivery).await {
            Err(TransportError::UnknownReceipt(_)) => {
                tracing::debug!(job_id = %delivery.envelope.job_id, "Lease expired before ack");
                Ok(())
            }
            other => other.map_err(ConsumerError::from),
        }
    }

    /// Schedule the next attempt of a job that is pending again.
    ///
    /// Without a live lease the redelivered copy is the transport's, visible on
    /// its own schedule, so a fresh envelope carries the backoff instead. The
    /// stray copy is deferred or dropped by whichever consumer receives it.
    async fn reschedule(
        &self,
        delivery: &Delivery,
        job: &Job,
        delay: Duration,
    ) -> Result<(), ConsumerError> {
        match self.transport.retry(delivery, Some(delay)).await {
            Err(TransportError::UnknownReceipt(_)) => {
                tracing::warn!(
                    job_id = %job.id,
                    "Lease expired while the handler ran, publishing a fresh envelope"
                );
                let envelope = Envelope::for_job(job).not_before(later(self.clock.now(), delay));
                self.transport.publish(envelope).await?;
                Ok(())
            }
            other => other.map_err(ConsumerError::from),
        }
    }
}
