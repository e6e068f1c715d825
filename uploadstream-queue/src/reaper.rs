use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use uploadstream_metadata::MetadataStore;

use crate::{JobNotifier, QueueError, QueueResult};

/// Outcome of one recovery pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Jobs returned from a dead worker
    pub reclaimed: usize,
    /// Files that got the job their upload failed to create
    pub reenqueued: usize,
}

/// Recovers work the happy path can lose: jobs whose worker died while
/// processing, and committed files whose job was never created.
pub struct JobReaper {
    metadata: Arc<dyn MetadataStore>,
    notifier: JobNotifier,
    stale_after: Duration,
    orphan_batch: usize,
}

impl JobReaper {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        notifier: JobNotifier,
        stale_after: Duration,
        orphan_batch: usize,
    ) -> Self {
        Self {
            metadata,
            notifier,
            stale_after,
            orphan_batch,
        }
    }

    /// Run one recovery pass.
    pub async fn reap(&self) -> QueueResult<ReapReport> {
        let stale_after = chrono::Duration::from_std(self.stale_after)
            .map_err(|e| QueueError::Internal(format!("stale_after out of range: {e}")))?;
        let reclaimed = self.metadata.reclaim_stale_jobs(Utc::now() - stale_after).await?;
        if reclaimed > 0 {
            info!("Reclaimed {} stale jobs", reclaimed);
        }

        let mut reenqueued = 0;
        for file in self.metadata.files_without_jobs(self.orphan_batch).await? {
            match self.metadata.create_job(&file.id).await {
                Ok(job_id) => {
                    debug!("Re-enqueued file {} as job {}", file.id, job_id);
                    reenqueued += 1;
                }
                Err(e) => warn!("Failed to re-enqueue file {}: {}", file.id, e),
            }
        }
        if reenqueued > 0 {
            info!("Re-enqueued {} files without jobs", reenqueued);
        }

        if reclaimed > 0 || reenqueued > 0 {
            self.notifier.notify();
        }

        Ok(ReapReport { reclaimed, reenqueued })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uploadstream_metadata::{FileId, FileRecord, JobStatus, MemoryMetadataStore};

    #[tokio::test]
    async fn reenqueues_files_without_jobs() {
        let store = MemoryMetadataStore::new();
        let file = FileRecord::new(FileId::new(), "alice", "notes.txt", "text/plain", 5);
        store.save_file(&file).await.unwrap();

        let reaper = JobReaper::new(Arc::new(store.clone()), JobNotifier::new(), Duration::from_secs(600), 10);
        let report = reaper.reap().await.unwrap();

        assert_eq!(report, ReapReport { reclaimed: 0, reenqueued: 1 });
        let job = store.get_job_by_file(&file.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        // Second pass finds nothing to do.
        assert_eq!(reaper.reap().await.unwrap(), ReapReport::default());
    }

    #[tokio::test]
    async fn reclaims_abandoned_processing_jobs() {
        let store = MemoryMetadataStore::new();
        let job_id = store.create_job(&FileId::new()).await.unwrap();
        store.claim_next_job().await.unwrap().unwrap();
        store.force_stale(job_id, chrono::Duration::minutes(20));

        let reaper = JobReaper::new(Arc::new(store.clone()), JobNotifier::new(), Duration::from_secs(600), 10);
        let report = reaper.reap().await.unwrap();

        assert_eq!(report.reclaimed, 1);
        assert!(store.get_job(job_id).await.unwrap().is_eligible());
    }
}
