//! PostgreSQL-backed metadata store.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, Pool, Postgres};
use tracing::{debug, info};

use crate::{
    FileId, FileRecord, FileType, JobCompletion, JobId, JobStatus, MetadataError, MetadataResult, MetadataStore,
    ProcessingJob, ThumbnailKeys, DEFAULT_MAX_RETRIES, STALE_JOB_MESSAGE,
};

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("schema.sql");

fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

const FILE_COLUMNS: &str =
    "id, user_id, filename, content_type, size, storage_path, file_type, uploaded_at, deleted_at";

const JOB_COLUMNS: &str = "id, file_id, status, retry_count, max_retries, error_message, \
     thumbnail_small, thumbnail_medium, thumbnail_large, original_width, original_height, \
     created_at, updated_at, completed_at";

#[derive(Debug, FromRow)]
struct FileRow {
    id: String,
    user_id: String,
    filename: String,
    content_type: String,
    size: i64,
    storage_path: String,
    file_type: String,
    uploaded_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<FileRow> for FileRecord {
    type Error = MetadataError;

    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        Ok(FileRecord {
            size: u64::try_from(row.size)
                .map_err(|_| MetadataError::Corrupt(format!("negative size on file {}", row.id)))?,
            file_type: FileType::from_str(&row.file_type)?,
            id: FileId(row.id),
            owner_id: row.user_id,
            display_name: row.filename,
            content_type: row.content_type,
            blob_key: row.storage_path,
            uploaded_at: row.uploaded_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: i64,
    file_id: String,
    status: String,
    retry_count: i32,
    max_retries: i32,
    error_message: Option<String>,
    thumbnail_small: Option<String>,
    thumbnail_medium: Option<String>,
    thumbnail_large: Option<String>,
    original_width: Option<i32>,
    original_height: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

fn non_negative(value: i32, column: &str, job_id: i64) -> MetadataResult<u32> {
    u32::try_from(value).map_err(|_| MetadataError::Corrupt(format!("negative {column} on job {job_id}")))
}

impl TryFrom<JobRow> for ProcessingJob {
    type Error = MetadataError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let id = row.id;
        Ok(ProcessingJob {
            id: JobId(id),
            file_id: FileId(row.file_id),
            status: JobStatus::from_str(&row.status)?,
            retry_count: non_negative(row.retry_count, "retry_count", id)?,
            max_retries: non_negative(row.max_retries, "max_retries", id)?,
            error_message: row.error_message,
            thumbnails: ThumbnailKeys {
                small: row.thumbnail_small,
                medium: row.thumbnail_medium,
                large: row.thumbnail_large,
            },
            original_width: row.original_width.map(|w| non_negative(w, "original_width", id)).transpose()?,
            original_height: row.original_height.map(|h| non_negative(h, "original_height", id)).transpose()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

fn to_i32(value: u32, what: &str) -> MetadataResult<i32> {
    i32::try_from(value).map_err(|_| MetadataError::Corrupt(format!("{what} {value} does not fit the column")))
}

/// Metadata store on PostgreSQL. The job claim uses `FOR UPDATE SKIP LOCKED`,
/// so any number of processes can claim from the same table.
#[derive(Debug, Clone)]
pub struct PgMetadataStore {
    pool: Pool<Postgres>,
    max_retries: u32,
}

impl PgMetadataStore {
    /// Connect from a URL and apply the schema.
    pub async fn connect(url: &str, max_connections: u32) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        info!(max_connections, "Connected to PostgreSQL metadata store");

        let store = Self {
            pool,
            max_retries: DEFAULT_MAX_RETRIES,
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Attempts given to newly created jobs
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> MetadataResult<()> {
        for statement in schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Metadata schema is up to date");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn save_file(&self, record: &FileRecord) -> MetadataResult<()> {
        let size = i64::try_from(record.size)
            .map_err(|_| MetadataError::Corrupt(format!("size {} does not fit the column", record.size)))?;
        sqlx::query(
            "INSERT INTO files (id, user_id, filename, content_type, size, storage_path, file_type, uploaded_at, deleted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record.id.as_str())
        .bind(&record.owner_id)
        .bind(&record.display_name)
        .bind(&record.content_type)
        .bind(size)
        .bind(&record.blob_key)
        .bind(record.file_type.as_str())
        .bind(record.uploaded_at)
        .bind(record.deleted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_file(&self, id: &FileId) -> MetadataResult<FileRecord> {
        let row = sqlx::query_as::<_, FileRow>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| MetadataError::FileNotFound(id.to_string()))?.try_into()
    }

    async fn list_files(&self, owner_id: &str, limit: usize, offset: usize) -> MetadataResult<Vec<FileRecord>> {
        let rows = sqlx::query_as::<_, FileRow>(&format!(
            "SELECT {FILE_COLUMNS} FROM files \
             WHERE user_id = $1 AND deleted_at IS NULL \
             ORDER BY uploaded_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(owner_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FileRecord::try_from).collect()
    }

    async fn soft_delete_file(&self, id: &FileId, owner_id: &str) -> MetadataResult<()> {
        let result = sqlx::query(
            "UPDATE files SET deleted_at = NOW() WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(id.as_str())
        .bind(owner_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::FileNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn create_job(&self, file_id: &FileId) -> MetadataResult<JobId> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO processing_jobs (file_id, status, retry_count, max_retries) \
             VALUES ($1, 'pending', 0, $2) RETURNING id",
        )
        .bind(file_id.as_str())
        .bind(to_i32(self.max_retries, "max_retries")?)
        .fetch_one(&self.pool)
        .await?;
        Ok(JobId(id))
    }

    async fn claim_next_job(&self) -> MetadataResult<Option<ProcessingJob>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE processing_jobs SET status = 'processing', updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM processing_jobs \
                 WHERE status = 'pending' AND retry_count < max_retries \
                 ORDER BY created_at, id \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {JOB_COLUMNS}"
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProcessingJob::try_from).transpose()
    }

    async fn update_job_status(&self, job_id: JobId, status: JobStatus, message: Option<&str>) -> MetadataResult<()> {
        let result = sqlx::query(
            "UPDATE processing_jobs SET status = $2, error_message = COALESCE($3, error_message), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(job_id.0)
        .bind(status.as_str())
        .bind(message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::JobNotFound(job_id.0));
        }
        Ok(())
    }

    async fn complete_job(&self, job_id: JobId, completion: &JobCompletion) -> MetadataResult<()> {
        let width = completion.original_width.map(|w| to_i32(w, "width")).transpose()?;
        let height = completion.original_height.map(|h| to_i32(h, "height")).transpose()?;
        let result = sqlx::query(
            "UPDATE processing_jobs SET status = 'completed', error_message = NULL, \
             thumbnail_small = $2, thumbnail_medium = $3, thumbnail_large = $4, \
             original_width = $5, original_height = $6, \
             completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(job_id.0)
        .bind(completion.thumbnails.small.as_deref())
        .bind(completion.thumbnails.medium.as_deref())
        .bind(completion.thumbnails.large.as_deref())
        .bind(width)
        .bind(height)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::JobNotFound(job_id.0));
        }
        Ok(())
    }

    async fn get_job_by_file(&self, file_id: &FileId) -> MetadataResult<Option<ProcessingJob>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM processing_jobs WHERE file_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(file_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProcessingJob::try_from).transpose()
    }

    async fn get_job(&self, job_id: JobId) -> MetadataResult<ProcessingJob> {
        let row = sqlx::query_as::<_, JobRow>(&format!("SELECT {JOB_COLUMNS} FROM processing_jobs WHERE id = $1"))
            .bind(job_id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or(MetadataError::JobNotFound(job_id.0))?.try_into()
    }

    async fn fail_job(&self, job_id: JobId, message: &str, retryable: bool) -> MetadataResult<JobStatus> {
        // Right-hand sides see the pre-update row.
        let status: Option<String> = sqlx::query_scalar(
            "UPDATE processing_jobs SET \
                 retry_count = CASE WHEN $3 THEN retry_count + 1 ELSE retry_count END, \
                 status = CASE WHEN $3 AND retry_count + 1 < max_retries THEN 'pending' ELSE 'failed' END, \
                 error_message = $2, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING status",
        )
        .bind(job_id.0)
        .bind(message)
        .bind(retryable)
        .fetch_optional(&self.pool)
        .await?;

        JobStatus::from_str(&status.ok_or(MetadataError::JobNotFound(job_id.0))?)
    }

    async fn reclaim_stale_jobs(&self, older_than: DateTime<Utc>) -> MetadataResult<usize> {
        let result = sqlx::query(
            "UPDATE processing_jobs SET \
                 retry_count = retry_count + 1, \
                 status = CASE WHEN retry_count + 1 < max_retries THEN 'pending' ELSE 'failed' END, \
                 error_message = $2, \
                 updated_at = NOW() \
             WHERE status = 'processing' AND updated_at < $1",
        )
        .bind(older_than)
        .bind(STALE_JOB_MESSAGE)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn files_without_jobs(&self, limit: usize) -> MetadataResult<Vec<FileRecord>> {
        let rows = sqlx::query_as::<_, FileRow>(&format!(
            "SELECT {FILE_COLUMNS} FROM files f \
             WHERE f.deleted_at IS NULL \
               AND NOT EXISTS (SELECT 1 FROM processing_jobs j WHERE j.file_id = f.id) \
             ORDER BY f.uploaded_at, f.id \
             LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FileRecord::try_from).collect()
    }
}
