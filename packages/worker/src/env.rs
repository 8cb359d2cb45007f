//! Worker settings read from the environment.

use std::str::FromStr;

use queue_core::QueueConfig;
use queue_db::DbConfig;

/// Settings for one worker process.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub db: DbConfig,
    pub queue: QueueConfig,
    /// Enqueue a handful of demo jobs at start.
    pub demo_jobs: bool,
}

impl WorkerSettings {
    pub fn from_env() -> Self {
        let mut db = DbConfig::endpoint(var("QUEUE_DB_ENDPOINT").unwrap_or_else(|| "mem://".into()));
        if let Some(namespace) = var("QUEUE_DB_NAMESPACE") {
            db = db.with_namespace(namespace);
        }
        if let Some(database) = var("QUEUE_DB_DATABASE") {
            db = db.with_database(database);
        }

        let mut queue = QueueConfig::default();
        if let Some(concurrency) = parsed("QUEUE_CONCURRENCY") {
            queue = queue.with_concurrency(concurrency);
        }
        if let Some(batch_size) = parsed("QUEUE_BATCH_SIZE") {
            queue = queue.with_batch_size(batch_size);
        }
        if let Some(max_attempts) = parsed("QUEUE_MAX_ATTEMPTS") {
            queue.default_max_attempts = max_attempts;
        }

        Self {
            db,
            queue,
            demo_jobs: parsed("QUEUE_DEMO_JOBS").unwrap_or(false),
        }
    }
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {}={}", key, raw);
            None
        }
    }
}
