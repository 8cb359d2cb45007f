#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use queue_core::{Clock, Job, JobFilter, JobId, JobPatch, ManualClock, Page, QueueConfig, Revision};
use queue_db::{JobStore, MemoryJobStore, StoreError};
use serde_json::Value;

use queue_actors::{BatchReport, Consumer, ConsumerError, HandlerRegistry, JobQueue, MemoryTransport};

const MAX_ROUNDS: usize = 100;

pub fn origin() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
}

/// A queue over in-memory store and transport, driven by a manual clock.
pub struct Harness<S = MemoryJobStore> {
    pub clock: Arc<ManualClock>,
    pub store: Arc<S>,
    pub transport: Arc<MemoryTransport>,
    pub queue: JobQueue<S, MemoryTransport>,
}

impl Harness<MemoryJobStore> {
    pub fn new(handlers: HandlerRegistry) -> Self {
        Self::with_config(handlers, QueueConfig::default())
    }

    pub fn with_config(handlers: HandlerRegistry, config: QueueConfig) -> Self {
        Self::with_store(MemoryJobStore::new(), handlers, config)
    }

    /// Handlers built with access to the harness clock and transport.
    pub fn wired(
        config: QueueConfig,
        handlers: impl FnOnce(Arc<ManualClock>, Arc<MemoryTransport>) -> HandlerRegistry,
    ) -> Self {
        Self::assemble(MemoryJobStore::new(), config, handlers)
    }
}

impl<S: JobStore> Harness<S> {
    pub fn with_store(store: S, handlers: HandlerRegistry, config: QueueConfig) -> Self {
        Self::assemble(store, config, |_, _| handlers)
    }

    fn assemble(
        store: S,
        config: QueueConfig,
        handlers: impl FnOnce(Arc<ManualClock>, Arc<MemoryTransport>) -> HandlerRegistry,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(origin()));
        let store = Arc::new(store);
        let transport = Arc::new(MemoryTransport::new(
            clock.clone(),
            config.visibility_timeout(),
        ));
        let handlers = handlers(clock.clone(), transport.clone());
        let queue = JobQueue::new(store.clone(), transport.clone(), handlers)
            .with_config(config)
            .with_clock(clock.clone());

        Self {
            clock,
            store,
            transport,
            queue,
        }
    }

    pub fn consumer(&self) -> Consumer<S, MemoryTransport> {
        self.queue.consumer()
    }

    pub async fn job(&self, id: JobId) -> Result<Job, Box<dyn std::error::Error>> {
        Ok(self.queue.get_job(id).await?.ok_or("job missing")?)
    }

    /// Poll until nothing is left, jumping the clock to each next delivery.
    pub async fn drain(&self) -> Result<BatchReport, ConsumerError> {
        let consumer = self.consumer();
        let mut total = BatchReport::default();

        for _ in 0..MAX_ROUNDS {
            let report = consumer.poll_once().await?;
            total.merge(&report);
            if report.received > 0 {
                continue;
            }
            match self.transport.next_visible_at().await {
                Some(at) if at > self.clock.now() => self.clock.set(at),
                _ => break,
            }
        }

        Ok(total)
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

/// Handlers: `echo` returns its payload, `count` counts calls and returns the count.
pub fn echo_handlers(calls: Arc<AtomicU32>) -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();
    handlers.register_fn("echo", |payload: Value| async move { Ok(payload) });
    handlers.register_fn("count", move |_: Value| {
        let calls = calls.clone();
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Value::from(n))
        }
    });
    handlers
}

/// A handler for `flaky` that fails its first `failures` calls.
pub fn flaky_handlers(calls: Arc<AtomicU32>, failures: u32) -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();
    handlers.register_fn("flaky", move |_: Value| {
        let calls = calls.clone();
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= failures {
                Err(format!("failure {}", n))
            } else {
                Ok(serde_json::json!({"succeeded_on": n}))
            }
        }
    });
    handlers
}

/// Store wrapper whose conditional updates fail a set number of times.
pub struct FlakyStore {
    inner: MemoryJobStore,
    passes: AtomicUsize,
    failures: AtomicUsize,
}

impl FlakyStore {
    /// Fail the first `failures` conditional updates.
    pub fn new(failures: usize) -> Self {
        Self::after(0, failures)
    }

    /// Let `passes` conditional updates through, then fail the next `failures`.
    pub fn after(passes: usize, failures: usize) -> Self {
        Self {
            inner: MemoryJobStore::new(),
            passes: AtomicUsize::new(passes),
            failures: AtomicUsize::new(failures),
        }
    }

    fn should_fail(&self) -> bool {
        let take = |counter: &AtomicUsize| {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        };
        !take(&self.passes) && take(&self.failures)
    }
}

impl JobStore for FlakyStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        self.inner.create(job).await
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        self.inner.get(id).await
    }

    async fn update(&self, id: JobId, patch: &JobPatch) -> Result<Job, StoreError> {
        self.inner.update(id, patch).await
    }

    async fn compare_and_update(
        &self,
        id: JobId,
        expected: Revision,
        patch: &JobPatch,
    ) -> Result<Option<Job>, StoreError> {
        if self.should_fail() {
            return Err(StoreError::Query("injected failure".into()));
        }
        self.inner.compare_and_update(id, expected, patch).await
    }

    async fn list(&self, filter: &JobFilter, page: Page) -> Result<Vec<Job>, StoreError> {
        self.inner.list(filter, page).await
    }
}
