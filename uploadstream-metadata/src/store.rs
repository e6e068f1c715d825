use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{FileId, FileRecord, JobCompletion, JobId, JobStatus, MetadataResult, ProcessingJob};

/// Durable storage for file and job records.
///
/// Implementations must be safe for concurrent use from many tasks and, for
/// shared backends, from many processes. The load-bearing primitive is
/// [`MetadataStore::claim_next_job`]: each eligible job is handed to exactly
/// one caller.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Persist a new file record.
    async fn save_file(&self, record: &FileRecord) -> MetadataResult<()>;

    /// Fetch an active file. Soft-deleted files are `FileNotFound`.
    async fn get_file(&self, id: &FileId) -> MetadataResult<FileRecord>;

    /// Active files of `owner`, newest upload first.
    async fn list_files(&self, owner_id: &str, limit: usize, offset: usize) -> MetadataResult<Vec<FileRecord>>;

    /// Mark an active file of `owner` deleted. `FileNotFound` when nothing matched.
    async fn soft_delete_file(&self, id: &FileId, owner_id: &str) -> MetadataResult<()>;

    /// Create a pending job for `file_id`.
    async fn create_job(&self, file_id: &FileId) -> MetadataResult<JobId>;

    /// Atomically take the oldest eligible job and mark it processing.
    /// `None` when nothing is eligible.
    async fn claim_next_job(&self) -> MetadataResult<Option<ProcessingJob>>;

    /// Set a job's status, recording `message` when given.
    async fn update_job_status(&self, job_id: JobId, status: JobStatus, message: Option<&str>) -> MetadataResult<()>;

    /// Mark a job completed with its derived artifacts.
    async fn complete_job(&self, job_id: JobId, completion: &JobCompletion) -> MetadataResult<()>;

    /// Most recent job of a file.
    async fn get_job_by_file(&self, file_id: &FileId) -> MetadataResult<Option<ProcessingJob>>;

    /// Fetch a job by id.
    async fn get_job(&self, job_id: JobId) -> MetadataResult<ProcessingJob>;

    /// Record a failed attempt and return the resulting status: `Pending`
    /// when a retryable failure leaves attempts, otherwise `Failed`.
    async fn fail_job(&self, job_id: JobId, message: &str, retryable: bool) -> MetadataResult<JobStatus>;

    /// Return jobs stuck in `processing` since before `older_than` to the
    /// pending pool, counting the lost attempt. Returns how many were touched.
    async fn reclaim_stale_jobs(&self, older_than: DateTime<Utc>) -> MetadataResult<usize>;

    /// Active files that have no job at all, oldest first.
    async fn files_without_jobs(&self, limit: usize) -> MetadataResult<Vec<FileRecord>>;
}

/// Message recorded on jobs reclaimed from a dead worker.
pub const STALE_JOB_MESSAGE: &str = "worker stopped before finishing the job";
