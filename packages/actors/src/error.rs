//! Error types for queue operations.

use queue_core::{JobId, ValidationError};
use queue_db::StoreError;
use thiserror::Error;

use crate::transport::TransportError;

/// Why an enqueue did not complete.
#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("Invalid job: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Failed to persist job: {0}")]
    Store(#[from] StoreError),

    /// The job was persisted as pending but no envelope is in flight for it.
    #[error("Job {job_id} persisted but publish failed: {source}")]
    Publish {
        job_id: JobId,
        #[source]
        source: TransportError,
    },
}

impl EnqueueError {
    /// The id of a job that exists in the store despite the error.
    pub fn persisted_job(&self) -> Option<JobId> {
        match self {
            EnqueueError::Publish { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }
}

/// Infrastructure failure while processing a delivery. The delivery is left unacked.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors from the [`JobQueue`](crate::JobQueue) facade.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error(transparent)]
    Enqueue(#[from] EnqueueError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
