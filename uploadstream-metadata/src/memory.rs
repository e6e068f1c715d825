use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use crate::{
    FileId, FileRecord, JobCompletion, JobId, JobStatus, MetadataError, MetadataResult, MetadataStore,
    ProcessingJob, DEFAULT_MAX_RETRIES, STALE_JOB_MESSAGE,
};

/// Operations that can be made to fail on purpose in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    SaveFile,
    GetFile,
    CreateJob,
    SoftDelete,
    CompleteJob,
}

#[derive(Debug, Default)]
struct State {
    files: HashMap<FileId, FileRecord>,
    /// Insertion order, breaks ties between equal upload timestamps
    file_seq: HashMap<FileId, u64>,
    jobs: BTreeMap<JobId, ProcessingJob>,
    next_file_seq: u64,
    next_job_id: i64,
}

/// In-memory metadata store for tests and single-process deployments.
///
/// Every mutation happens under one write lock, which is what makes
/// [`MetadataStore::claim_next_job`] atomic here.
#[derive(Debug, Clone)]
pub struct MemoryMetadataStore {
    state: Arc<RwLock<State>>,
    failpoints: Arc<RwLock<HashSet<FailPoint>>>,
    max_retries: u32,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::with_max_retries(DEFAULT_MAX_RETRIES)
    }

    /// Create a store whose jobs get `max_retries` attempts
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            failpoints: Arc::new(RwLock::new(HashSet::new())),
            max_retries,
        }
    }

    fn check(&self, point: FailPoint) -> MetadataResult<()> {
        if self.failpoints.read().contains(&point) {
            return Err(MetadataError::unavailable(format!("injected failure at {point:?}")));
        }
        Ok(())
    }
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn save_file(&self, record: &FileRecord) -> MetadataResult<()> {
        self.check(FailPoint::SaveFile)?;
        let mut state = self.state.write();
        if state.files.contains_key(&record.id) {
            return Err(MetadataError::Duplicate(record.id.to_string()));
        }
        let seq = state.next_file_seq;
        state.next_file_seq += 1;
        state.file_seq.insert(record.id.clone(), seq);
        state.files.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_file(&self, id: &FileId) -> MetadataResult<FileRecord> {
        self.check(FailPoint::GetFile)?;
        self.state
            .read()
            .files
            .get(id)
            .filter(|f| f.is_active())
            .cloned()
            .ok_or_else(|| MetadataError::FileNotFound(id.to_string()))
    }

    async fn list_files(&self, owner_id: &str, limit: usize, offset: usize) -> MetadataResult<Vec<FileRecord>> {
        let state = self.state.read();
        let mut owned: Vec<(&FileRecord, u64)> = state
            .files
            .values()
            .filter(|f| f.owner_id == owner_id && f.is_active())
            .map(|f| (f, state.file_seq.get(&f.id).copied().unwrap_or_default()))
            .collect();

        owned.sort_by(|(a, a_seq), (b, b_seq)| {
            b.uploaded_at.cmp(&a.uploaded_at).then_with(|| b_seq.cmp(a_seq))
        });

        Ok(owned
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(f, _)| f.clone())
            .collect())
    }

    async fn soft_delete_file(&self, id: &FileId, owner_id: &str) -> MetadataResult<()> {
        self.check(FailPoint::SoftDelete)?;
        let mut state = self.state.write();
        match state.files.get_mut(id) {
            Some(record) if record.owner_id == owner_id && record.is_active() => {
                record.deleted_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(MetadataError::FileNotFound(id.to_string())),
        }
    }

    async fn create_job(&self, file_id: &FileId) -> MetadataResult<JobId> {
        self.check(FailPoint::CreateJob)?;
        let mut state = self.state.write();
        state.next_job_id += 1;
        let job_id = JobId(state.next_job_id);
        state
            .jobs
            .insert(job_id, ProcessingJob::new(job_id, file_id.clone(), self.max_retries));
        debug!("Created job {} for file {}", job_id, file_id);
        Ok(job_id)
    }

    async fn claim_next_job(&self) -> MetadataResult<Option<ProcessingJob>> {
        let mut state = self.state.write();
        let next = state
            .jobs
            .values()
            .filter(|job| job.is_eligible())
            .min_by_key(|job| (job.created_at, job.id))
            .map(|job| job.id);

        Ok(next.and_then(|job_id| {
            state.jobs.get_mut(&job_id).map(|job| {
                job.start_processing();
                job.clone()
            })
        }))
    }

    async fn update_job_status(&self, job_id: JobId, status: JobStatus, message: Option<&str>) -> MetadataResult<()> {
        let mut state = self.state.write();
        let job = state.jobs.get_mut(&job_id).ok_or(MetadataError::JobNotFound(job_id.0))?;
        job.update_status(status, message);
        Ok(())
    }

    async fn complete_job(&self, job_id: JobId, completion: &JobCompletion) -> MetadataResult<()> {
        self.check(FailPoint::CompleteJob)?;
        let mut state = self.state.write();
        let job = state.jobs.get_mut(&job_id).ok_or(MetadataError::JobNotFound(job_id.0))?;
        job.complete(completion);
        Ok(())
    }

    async fn get_job_by_file(&self, file_id: &FileId) -> MetadataResult<Option<ProcessingJob>> {
        Ok(self
            .state
            .read()
            .jobs
            .values()
            .filter(|job| &job.file_id == file_id)
            .max_by_key(|job| (job.created_at, job.id))
            .cloned())
    }

    async fn get_job(&self, job_id: JobId) -> MetadataResult<ProcessingJob> {
        self.state
            .read()
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(MetadataError::JobNotFound(job_id.0))
    }

    async fn fail_job(&self, job_id: JobId, message: &str, retryable: bool) -> MetadataResult<JobStatus> {
        let mut state = self.state.write();
        let job = state.jobs.get_mut(&job_id).ok_or(MetadataError::JobNotFound(job_id.0))?;
        Ok(job.fail(message, retryable))
    }

    async fn reclaim_stale_jobs(&self, older_than: DateTime<Utc>) -> MetadataResult<usize> {
        let mut state = self.state.write();
        let mut reclaimed = 0;
        for job in state.jobs.values_mut() {
            if job.status == JobStatus::Processing && job.updated_at < older_than {
                debug!("Reclaiming stale job {}", job.id);
                job.fail(STALE_JOB_MESSAGE, true);
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn files_without_jobs(&self, limit: usize) -> MetadataResult<Vec<FileRecord>> {
        let state = self.state.read();
        let with_jobs: HashSet<&FileId> = state.jobs.values().map(|job| &job.file_id).collect();
        let mut orphans: Vec<&FileRecord> = state
            .files
            .values()
            .filter(|f| f.is_active() && !with_jobs.contains(&f.id))
            .collect();
        orphans.sort_by_key(|f| (f.uploaded_at, state.file_seq.get(&f.id).copied().unwrap_or_default()));
        Ok(orphans.into_iter().take(limit).cloned().collect())
    }
}

/// Test helpers for deterministic testing
impl MemoryMetadataStore {
    /// Make `point` fail until cleared
    pub fn fail_on(&self, point: FailPoint) {
        self.failpoints.write().insert(point);
    }

    /// Remove every injected failure
    pub fn clear_failures(&self) {
        self.failpoints.write().clear();
    }

    /// Push a job's `updated_at` into the past, as if its worker died
    pub fn force_stale(&self, job_id: JobId, age: chrono::Duration) {
        if let Some(job) = self.state.write().jobs.get_mut(&job_id) {
            job.updated_at = Utc::now() - age;
        }
    }

    /// Override a file's upload time
    pub fn set_uploaded_at(&self, id: &FileId, at: DateTime<Utc>) {
        if let Some(record) = self.state.write().files.get_mut(id) {
            record.uploaded_at = at;
        }
    }

    /// Number of stored files, deleted ones included
    pub fn file_count(&self) -> usize {
        self.state.read().files.len()
    }

    /// Number of stored jobs
    pub fn job_count(&self) -> usize {
        self.state.read().jobs.len()
    }

    /// Raw record lookup that also sees soft-deleted files
    pub fn raw_file(&self, id: &FileId) -> Option<FileRecord> {
        self.state.read().files.get(id).cloned()
    }
}
