//! The queue facade: one handle over store, transport and handlers.

use std::sync::Arc;
use std::time::Duration;

use queue_core::{
    Clock, Job, JobEvent, JobFilter, JobId, JobOptions, JobStats, Page, QueueConfig, SystemClock,
};
use queue_db::{JobStore, StoreError};
use tokio::sync::broadcast;

use crate::admin::JobAdmin;
use crate::consumer::Consumer;
use crate::enqueuer::Enqueuer;
use crate::error::{EnqueueError, QueueError};
use crate::events::EventSink;
use crate::handler::HandlerRegistry;
use crate::stats::StatsAggregator;
use crate::transport::Transport;

const EVENT_CAPACITY: usize = 1024;

/// A durable job queue.
///
/// Cloning is cheap; clones share the store, transport and event channel.
pub struct JobQueue<S, T> {
    store: Arc<S>,
    transport: Arc<T>,
    handlers: Arc<HandlerRegistry>,
    clock: Arc<dyn Clock>,
    config: QueueConfig,
    events: EventSink,
}

impl<S, T> Clone for JobQueue<S, T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            transport: self.transport.clone(),
            handlers: self.handlers.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
            events: self.events.clone(),
        }
    }
}

impl<S: JobStore, T: Transport> JobQueue<S, T> {
    pub fn new(store: Arc<S>, transport: Arc<T>, handlers: HandlerRegistry) -> Self {
        Self {
            store,
            transport,
            handlers: Arc::new(handlers),
            clock: Arc::new(SystemClock),
            config: QueueConfig::default(),
            events: EventSink::new(EVENT_CAPACITY),
        }
    }

    pub fn with_config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn enqueuer(&self) -> Enqueuer<S, T> {
        Enqueuer::new(
            self.store.clone(),
            self.transport.clone(),
            self.clock.clone(),
            self.config.default_max_attempts,
            self.events.clone(),
        )
    }

    pub fn consumer(&self) -> Consumer<S, T> {
        Consumer::new(
            self.store.clone(),
            self.transport.clone(),
            self.handlers.clone(),
            self.clock.clone(),
            &self.config,
        )
        .with_events(self.events.clone())
    }

    pub fn admin(&self) -> JobAdmin<S, T> {
        JobAdmin::new(
            self.store.clone(),
            self.transport.clone(),
            self.clock.clone(),
            &self.config,
        )
        .with_events(self.events.clone())
    }

    pub fn stats(&self) -> StatsAggregator<S> {
        StatsAggregator::new(self.store.clone(), self.config.stats_page_size)
    }

    /// Persist a new job and publish it for delivery.
    pub async fn enqueue(
        &self,
        job_type: impl Into<String>,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> Result<JobId, EnqueueError> {
        self.enqueuer().enqueue(job_type, payload, options).await
    }

    /// Read a job's current state.
    pub async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        self.store.get(id).await
    }

    pub async fn list_jobs(&self, filter: &JobFilter, page: Page) -> Result<Vec<Job>, StoreError> {
        self.store.list(filter, page).await
    }

    /// Return a failed job with attempts left to pending and republish it.
    pub async fn retry_job(&self, id: JobId) -> Result<bool, QueueError> {
        self.admin().retry_job(id).await
    }

    /// Fail a pending or processing job as cancelled.
    pub async fn cancel_job(&self, id: JobId) -> Result<bool, StoreError> {
        self.admin().cancel_job(id).await
    }

    pub async fn get_stats(&self) -> Result<JobStats, StoreError> {
        self.stats().get_stats().await
    }

    /// Republish pending and processing jobs untouched for `older_than`.
    pub async fn republish_stale(&self, older_than: Duration) -> Result<usize, QueueError> {
        self.admin().republish_stale(older_than).await
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events
            .subscribe()
            .unwrap_or_else(|| broadcast::channel(1).1)
    }
}
