use chrono::{DateTime, Duration, Utc};
use queue_core::{Job, JobOptions};
use serde_json::{Map, Value};

use queue_db::{DbConfig, StoreError, SurrealJobStore};

pub fn payload_with_message(message: &str) -> Value {
    let mut map = Map::new();
    map.insert("msg".to_string(), Value::String(message.to_string()));
    Value::Object(map)
}

/// A pending job created `offset_ms` after a fixed origin, so ordering is stable.
pub fn job_at(job_type: &str, offset_ms: i64) -> Job {
    let origin: DateTime<Utc> = DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default();
    Job::new(
        job_type,
        payload_with_message(job_type),
        &JobOptions::default(),
        3,
        origin + Duration::milliseconds(offset_ms),
    )
}

/// A fresh, isolated in-memory SurrealDB instance.
pub async fn surreal_store() -> Result<SurrealJobStore, StoreError> {
    SurrealJobStore::connect(&DbConfig::memory()).await
}
