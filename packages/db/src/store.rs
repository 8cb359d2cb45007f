//! The persistence contract the queue core requires.

use std::future::Future;

use queue_core::{Job, JobFilter, JobId, JobPatch, JobStatus, Page, Revision};
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job already exists: {0}")]
    Conflict(JobId),
    #[error("Job not found: {0}")]
    NotFound(JobId),
    #[error("Job {id} cannot move from {from} to {to}")]
    IllegalTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Refuse a conditional patch whose status change is not a lifecycle edge.
pub(crate) fn check_transition(
    id: JobId,
    expected: Revision,
    patch: &JobPatch,
) -> Result<(), StoreError> {
    match patch.status {
        Some(to) if !expected.status.can_transition_to(to) => Err(StoreError::IllegalTransition {
            id,
            from: expected.status,
            to,
        }),
        _ => Ok(()),
    }
}

/// Key-addressable job persistence.
///
/// Implementations must tolerate concurrent callers. `update` is a
/// last-write-wins merge with no lifecycle checks; `compare_and_update` only
/// applies when the stored `(status, attempts)` still equals `expected` and
/// the patched status is a legal successor of `expected.status`.
pub trait JobStore: Send + Sync + 'static {
    /// Insert a new job. Fails with [`StoreError::Conflict`] if the id exists.
    fn create(&self, job: &Job) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Load a job by id.
    fn get(&self, id: JobId) -> impl Future<Output = Result<Option<Job>, StoreError>> + Send;

    /// Merge `patch` into the stored job and return the result.
    fn update(
        &self,
        id: JobId,
        patch: &JobPatch,
    ) -> impl Future<Output = Result<Job, StoreError>> + Send;

    /// Merge `patch` only if the stored revision matches `expected`.
    ///
    /// Returns `Ok(None)` when the revision moved on,
    /// [`StoreError::NotFound`] when the job is absent and
    /// [`StoreError::IllegalTransition`] without touching the store when the
    /// status change is not allowed.
    fn compare_and_update(
        &self,
        id: JobId,
        expected: Revision,
        patch: &JobPatch,
    ) -> impl Future<Output = Result<Option<Job>, StoreError>> + Send;

    /// List jobs matching `filter`, oldest first.
    fn list(
        &self,
        filter: &JobFilter,
        page: Page,
    ) -> impl Future<Output = Result<Vec<Job>, StoreError>> + Send;
}
