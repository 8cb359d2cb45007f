//! SurrealDB-backed job store.

use chrono::{DateTime, Utc};
use queue_core::{Job, JobFilter, JobId, JobPatch, JobStatus, Page, Revision};
use serde::{Deserialize, Serialize};

use crate::store::check_transition;
use crate::{Database, DbConfig, JobStore, StoreError, connect_db, init_schema};

const TABLE: &str = "job";

/// Job store persisting one record per job in the `job` table.
///
/// Records are keyed by the job id, so listing in record-id order follows
/// creation order to millisecond precision.
#[derive(Clone)]
pub struct SurrealJobStore {
    db: Database,
}

/// Internal record type for SurrealDB. The record id carries the job id;
/// `job_id` duplicates it so reads need no `Thing` parsing.
#[derive(Debug, Serialize, Deserialize)]
struct JobRecord {
    job_id: JobId,
    job_type: String,
    payload: serde_json::Value,
    status: JobStatus,
    priority: i32,
    attempts: u32,
    max_attempts: u32,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    scheduled_for: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobRecord {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type.clone(),
            payload: job.payload.clone(),
            status: job.status,
            priority: job.priority,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            result: job.result.clone(),
            error: job.error.clone(),
            scheduled_for: job.scheduled_for,
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
        }
    }
}

impl From<JobRecord> for Job {
    fn from(record: JobRecord) -> Self {
        Job {
            id: record.job_id,
            job_type: record.job_type,
            payload: record.payload,
            status: record.status,
            priority: record.priority,
            attempts: record.attempts,
            max_attempts: record.max_attempts,
            result: record.result,
            error: record.error,
            scheduled_for: record.scheduled_for,
            created_at: record.created_at,
            updated_at: record.updated_at,
            completed_at: record.completed_at,
        }
    }
}

impl SurrealJobStore {
    /// Wrap an already connected database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Connect, select namespace/database and make sure the schema exists.
    pub async fn connect(config: &DbConfig) -> Result<Self, StoreError> {
        let db = connect_db(config).await?;
        init_schema(&db).await?;
        Ok(Self::new(db))
    }

    fn patch_value(patch: &JobPatch) -> Result<serde_json::Value, StoreError> {
        Ok(serde_json::to_value(patch)?)
    }
}

impl JobStore for SurrealJobStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        let existing: Option<JobRecord> = self.db.select((TABLE, job.id.to_string())).await?;
        if existing.is_some() {
            return Err(StoreError::Conflict(job.id));
        }

        let created: Result<Option<JobRecord>, surrealdb::Error> = self
            .db
            .create((TABLE, job.id.to_string()))
            .content(JobRecord::from(job))
            .await;

        match created {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(StoreError::Query(format!("Failed to create job {}", job.id))),
            // A concurrent writer won the race between the select and the create.
            Err(e) if e.to_string().contains("already exists") => {
                Err(StoreError::Conflict(job.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let record: Option<JobRecord> = self.db.select((TABLE, id.to_string())).await?;
        Ok(record.map(Job::from))
    }

    async fn update(&self, id: JobId, patch: &JobPatch) -> Result<Job, StoreError> {
        let record: Option<JobRecord> = self
            .db
            .update((TABLE, id.to_string()))
            .merge(Self::patch_value(patch)?)
            .await?;

        record.map(Job::from).ok_or(StoreError::NotFound(id))
    }

    async fn compare_and_update(
        &self,
        id: JobId,
        expected: Revision,
        patch: &JobPatch,
    ) -> Result<Option<Job>, StoreError> {
        check_transition(id, expected, patch)?;
        let mut response = self
            .db
            .query(
                r#"
                UPDATE type::thing($table, $id) MERGE $patch
                WHERE status = $status AND attempts = $attempts
                RETURN AFTER
                "#,
            )
            .bind(("table", TABLE))
            .bind(("id", id.to_string()))
            .bind(("patch", Self::patch_value(patch)?))
            .bind(("status", expected.status.as_str()))
            .bind(("attempts", i64::from(expected.attempts)))
            .await?;

        let records: Vec<JobRecord> = response.take(0)?;
        if let Some(record) = records.into_iter().next() {
            return Ok(Some(record.into()));
        }

        // Nothing matched: either the revision moved on or the job is gone.
        match self.get(id).await? {
            Some(_) => Ok(None),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn list(&self, filter: &JobFilter, page: Page) -> Result<Vec<Job>, StoreError> {
        let mut conditions = Vec::new();

        if filter.status.is_some() {
            conditions.push("status = $status");
        }
        if filter.job_type.is_some() {
            conditions.push("job_type = $job_type");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT * FROM job {} ORDER BY id ASC LIMIT $limit START $offset",
            where_clause
        );

        let mut request = self
            .db
            .query(query)
            .bind(("limit", page.limit as i64))
            .bind(("offset", page.offset as i64));

        if let Some(status) = filter.status {
            request = request.bind(("status", status.as_str()));
        }
        if let Some(job_type) = &filter.job_type {
            request = request.bind(("job_type", job_type.clone()));
        }

        let mut response = request.await?;
        let records: Vec<JobRecord> = response.take(0)?;

        Ok(records.into_iter().map(Job::from).collect())
    }
}
