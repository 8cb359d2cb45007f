//! In-memory job store for tests and single-process use.

use std::collections::HashMap;

use queue_core::{Job, JobFilter, JobId, JobPatch, Page, Revision};
use tokio::sync::RwLock;

use crate::store::check_transition;
use crate::{JobStore, StoreError};

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<JobId, Job>,
    /// Insertion order.
    order: Vec<JobId>,
}

/// Job store backed by a map behind an async lock.
#[derive(Default)]
pub struct MemoryJobStore {
    state: RwLock<MemoryState>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub async fn len(&self) -> usize {
        self.state.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(job.id));
        }
        state.order.push(job.id);
        state.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.state.read().await.jobs.get(&id).cloned())
    }

    async fn update(&self, id: JobId, patch: &JobPatch) -> Result<Job, StoreError> {
        let mut state = self.state.write().await;
        let job = state.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.apply(patch);
        Ok(job.clone())
    }

    async fn compare_and_update(
        &self,
        id: JobId,
        expected: Revision,
        patch: &JobPatch,
    ) -> Result<Option<Job>, StoreError> {
        check_transition(id, expected, patch)?;
        let mut state = self.state.write().await;
        let job = state.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if job.revision() != expected {
            return Ok(None);
        }
        job.apply(patch);
        Ok(Some(job.clone()))
    }

    async fn list(&self, filter: &JobFilter, page: Page) -> Result<Vec<Job>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.jobs.get(id))
            .filter(|job| filter.matches(job))
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }
}
