//! Status counts by scanning the store.

use std::sync::Arc;

use queue_core::{JobFilter, JobStats, Page};
use queue_db::{JobStore, StoreError};

/// Computes [`JobStats`] snapshots.
///
/// The scan is paged and not isolated from concurrent writers, so counts
/// are approximate while jobs are moving.
pub struct StatsAggregator<S> {
    store: Arc<S>,
    page_size: usize,
}

impl<S: JobStore> StatsAggregator<S> {
    pub fn new(store: Arc<S>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// Counts over every job.
    pub async fn get_stats(&self) -> Result<JobStats, StoreError> {
        self.get_stats_for(&JobFilter::default()).await
    }

    /// Counts over the jobs matching `filter`.
    pub async fn get_stats_for(&self, filter: &JobFilter) -> Result<JobStats, StoreError> {
        let mut stats = JobStats::default();
        let mut page = Page::first(self.page_size);

        loop {
            let jobs = self.store.list(filter, page).await?;
            for job in &jobs {
                stats.record(job.status);
            }
            if jobs.len() < page.limit {
                break;
            }
            page = page.next();
        }

        Ok(stats.finish())
    }
}
