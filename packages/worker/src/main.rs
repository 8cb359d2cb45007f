//! Job queue worker process.
//!
//! Connects the job store, starts the consumer pool and runs until ctrl-c.

mod env;
mod handlers;

use std::sync::Arc;

use queue_actors::{JobQueue, MemoryTransport, SupervisorMessage, start_consumers};
use queue_core::{JobOptions, SystemClock};
use queue_db::SurrealJobStore;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::env::WorkerSettings;
use crate::handlers::demo_handlers;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = WorkerSettings::from_env();
    tracing::info!("Starting job queue worker...");

    let store = Arc::new(SurrealJobStore::connect(&settings.db).await?);
    let clock = Arc::new(SystemClock);
    let transport = Arc::new(MemoryTransport::new(
        clock.clone(),
        settings.queue.visibility_timeout(),
    ));

    let queue = JobQueue::new(store, transport, demo_handlers())
        .with_config(settings.queue.clone())
        .with_clock(clock);

    // Jobs left unfinished by an earlier process have no envelope in this transport.
    let republished = queue.republish_stale(std::time::Duration::ZERO).await?;
    if republished > 0 {
        tracing::info!("Recovered {} unfinished jobs", republished);
    }

    let (supervisor, handle) = start_consumers(Arc::new(queue.consumer()), queue.config()).await?;

    if settings.demo_jobs {
        enqueue_demo_jobs(&queue).await?;
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    let stats = queue.get_stats().await?;
    tracing::info!(
        total = stats.total,
        completed = stats.completed,
        failed = stats.failed,
        active = stats.active(),
        "Final job stats"
    );

    supervisor.send_message(SupervisorMessage::Shutdown)?;
    handle.await?;

    tracing::info!("Worker stopped");
    Ok(())
}

async fn enqueue_demo_jobs(
    queue: &JobQueue<SurrealJobStore, MemoryTransport>,
) -> Result<(), Box<dyn std::error::Error>> {
    let jobs = [
        ("echo", json!({ "message": "hello" }), JobOptions::default()),
        ("sleep", json!({ "seconds": 2 }), JobOptions::default().with_priority(5)),
        ("fail", json!({ "fail": true }), JobOptions::default().with_max_attempts(2)),
    ];

    for (job_type, payload, options) in jobs {
        let id = queue.enqueue(job_type, payload, options).await?;
        tracing::info!("Enqueued demo job {} ({})", id, job_type);
    }
    Ok(())
}
