use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use uploadstream_metadata::{FileType, JobCompletion, JobStatus, MetadataStore, ProcessingJob};

use crate::{DerivativeProcessor, JobNotifier, JobReaper, QueueError, QueueResult, SchedulerConfig};

/// Message recorded when a job's file record is gone.
pub const FILE_NOT_FOUND_MESSAGE: &str = "File not found";

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was eligible
    Idle,
    /// Derived artifacts were produced and recorded
    Completed,
    /// Non-image file, completed without artifacts
    PassedThrough,
    /// The job failed and will not run again
    Failed,
    /// The job failed and went back to pending
    Requeued,
}

/// Handle for managing the scheduler loop
pub struct SchedulerHandle {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop future ticks and wait for the loop to exit. A tick already in
    /// flight finishes first.
    pub async fn shutdown(self) -> QueueResult<()> {
        let _ = self.shutdown_tx.send(());
        self.join_handle
            .await
            .map_err(|e| QueueError::Internal(format!("Scheduler join error: {}", e)))
    }
}

/// Claims one job per tick and runs it to an outcome.
///
/// Safe to run one instance per process against a shared store: exclusivity
/// comes entirely from [`MetadataStore::claim_next_job`].
pub struct JobScheduler {
    metadata: Arc<dyn MetadataStore>,
    processor: Arc<dyn DerivativeProcessor>,
    notifier: JobNotifier,
    reaper: JobReaper,
    config: SchedulerConfig,
    ticks: AtomicU64,
}

impl JobScheduler {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        processor: Arc<dyn DerivativeProcessor>,
        notifier: JobNotifier,
        config: SchedulerConfig,
    ) -> Self {
        let reaper = JobReaper::new(
            Arc::clone(&metadata),
            notifier.clone(),
            config.stale_after,
            config.orphan_batch,
        );
        Self {
            metadata,
            processor,
            notifier,
            reaper,
            config,
            ticks: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn notifier(&self) -> &JobNotifier {
        &self.notifier
    }

    /// Start the background loop.
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join_handle = tokio::spawn(async move { self.run(shutdown_rx).await });
        SchedulerHandle {
            shutdown_tx,
            join_handle,
        }
    }

    async fn run(&self, mut shutdown_rx: oneshot::Receiver<()>) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Job scheduler started (poll every {:?})", self.config.poll_interval);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => {
                    info!("Job scheduler shutdown requested");
                    break;
                }
                _ = ticker.tick() => {}
                _ = self.notifier.notified() => {
                    debug!("Job scheduler woken by new job");
                }
            }

            if let Err(e) = self.tick().await {
                error!("Error processing job: {}", e);
            }
            self.maybe_reap().await;
        }

        info!("Job scheduler stopped");
    }

    async fn maybe_reap(&self) {
        let every = self.config.reaper_every_ticks;
        if every == 0 {
            return;
        }
        let ticks = self.ticks.load(Ordering::Relaxed);
        if ticks > 0 && ticks % every == 0 {
            if let Err(e) = self.reaper.reap().await {
                warn!("Error during job recovery: {}", e);
            }
        }
    }

    /// Run one recovery pass now.
    pub async fn reap(&self) -> QueueResult<crate::ReapReport> {
        self.reaper.reap().await
    }

    /// Claim and process at most one job.
    pub async fn tick(&self) -> QueueResult<TickOutcome> {
        self.ticks.fetch_add(1, Ordering::Relaxed);

        let job = match self.metadata.claim_next_job().await? {
            Some(job) => job,
            None => return Ok(TickOutcome::Idle),
        };

        self.process(job).await
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, file_id = %job.file_id))]
    async fn process(&self, job: ProcessingJob) -> QueueResult<TickOutcome> {
        debug!("Processing job (attempt {} of {})", job.retry_count + 1, job.max_retries);

        let file = match self.metadata.get_file(&job.file_id).await {
            Ok(file) => file,
            Err(e) if e.is_not_found() => {
                warn!("Job references a missing file");
                self.metadata
                    .update_job_status(job.id, JobStatus::Failed, Some(FILE_NOT_FOUND_MESSAGE))
                    .await?;
                return Ok(TickOutcome::Failed);
            }
            Err(e) => {
                warn!("Could not load file record: {}", e);
                return self.record_failure(&job, &e.to_string(), true).await;
            }
        };

        if file.file_type != FileType::Image {
            debug!("Skipping processing for non-image: {}", file.file_type);
            return match self.metadata.complete_job(job.id, &JobCompletion::empty()).await {
                Ok(()) => Ok(TickOutcome::PassedThrough),
                Err(e) => {
                    warn!("Failed to save pass-through result: {}", e);
                    self.record_failure(&job, &format!("failed to save job results: {e}"), true)
                        .await
                }
            };
        }

        match self.processor.process(&file).await {
            Ok(completion) => match self.metadata.complete_job(job.id, &completion).await {
                Ok(()) => {
                    info!("Completed job: generated {} thumbnails", completion.thumbnails.keys().len());
                    Ok(TickOutcome::Completed)
                }
                Err(e) => {
                    warn!("Failed to save job results: {}", e);
                    self.record_failure(&job, &format!("failed to save job results: {e}"), true)
                        .await
                }
            },
            Err(job_error) => {
                self.record_failure(&job, job_error.message(), job_error.is_retryable())
                    .await
            }
        }
    }

    async fn record_failure(&self, job: &ProcessingJob, message: &str, retryable: bool) -> QueueResult<TickOutcome> {
        match self.metadata.fail_job(job.id, message, retryable).await? {
            JobStatus::Pending => {
                warn!("Job failed, will retry: {}", message);
                Ok(TickOutcome::Requeued)
            }
            _ => {
                error!("Job failed permanently: {}", message);
                Ok(TickOutcome::Failed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ThumbnailProcessor;
    use tracing_test::traced_test;
    use uploadstream_blob::MemoryBlobStore;
    use uploadstream_metadata::{FailPoint, FileId, FileRecord, MemoryMetadataStore};

    fn scheduler(metadata: &MemoryMetadataStore) -> JobScheduler {
        JobScheduler::new(
            Arc::new(metadata.clone()),
            Arc::new(ThumbnailProcessor::new(Arc::new(MemoryBlobStore::new()))),
            JobNotifier::new(),
            SchedulerConfig::default(),
        )
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_file_is_logged_and_failed() {
        let metadata = MemoryMetadataStore::new();
        metadata.create_job(&FileId::new()).await.unwrap();

        assert_eq!(scheduler(&metadata).tick().await.unwrap(), TickOutcome::Failed);
        assert!(logs_contain("Job references a missing file"));
    }

    #[tokio::test]
    async fn unreadable_file_record_is_retried() {
        let metadata = MemoryMetadataStore::new();
        let file = FileRecord::new(FileId::new(), "alice", "a.txt", "text/plain", 1);
        metadata.save_file(&file).await.unwrap();
        let job_id = metadata.create_job(&file.id).await.unwrap();
        metadata.fail_on(FailPoint::GetFile);

        assert_eq!(scheduler(&metadata).tick().await.unwrap(), TickOutcome::Requeued);
        let job = metadata.get_job(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 1);
    }

    #[tokio::test]
    async fn pass_through_save_failure_is_retried() {
        let metadata = MemoryMetadataStore::new();
        let file = FileRecord::new(FileId::new(), "alice", "a.txt", "text/plain", 1);
        metadata.save_file(&file).await.unwrap();
        let job_id = metadata.create_job(&file.id).await.unwrap();
        metadata.fail_on(FailPoint::CompleteJob);

        assert_eq!(scheduler(&metadata).tick().await.unwrap(), TickOutcome::Requeued);
        let job = metadata.get_job(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 1);
        assert!(job.error_message.unwrap().contains("failed to save job results"));

        metadata.clear_failures();
        assert_eq!(scheduler(&metadata).tick().await.unwrap(), TickOutcome::PassedThrough);
        assert_eq!(metadata.get_job(job_id).await.unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn reaper_runs_every_configured_tick() {
        let metadata = MemoryMetadataStore::new();
        let file = FileRecord::new(FileId::new(), "alice", "a.txt", "text/plain", 1);
        metadata.save_file(&file).await.unwrap();

        let scheduler = JobScheduler::new(
            Arc::new(metadata.clone()),
            Arc::new(ThumbnailProcessor::new(Arc::new(MemoryBlobStore::new()))),
            JobNotifier::new(),
            SchedulerConfig::default().with_reaper_every_ticks(2),
        );

        assert_eq!(scheduler.tick().await.unwrap(), TickOutcome::Idle);
        scheduler.maybe_reap().await;
        assert_eq!(metadata.job_count(), 0);

        assert_eq!(scheduler.tick().await.unwrap(), TickOutcome::Idle);
        scheduler.maybe_reap().await;
        assert_eq!(metadata.job_count(), 1);
    }
}
