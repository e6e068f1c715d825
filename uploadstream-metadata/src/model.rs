use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::MetadataError;

/// Jobs are created with this many attempts unless the store is configured otherwise.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Unique identifier for an uploaded file. Also the file's blob key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub String);

impl FileId {
    /// Generate a new random file ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from existing string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FileId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a processing job, assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broad category of a file, derived from its declared content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Video,
    Audio,
    Document,
    Other,
}

impl FileType {
    /// `image/*`, `video/*` and `audio/*` map to their category, anything
    /// mentioning `pdf` is a document, the rest is `other`.
    pub fn derive(content_type: &str) -> Self {
        let content_type = content_type.trim().to_ascii_lowercase();
        if content_type.starts_with("image/") {
            Self::Image
        } else if content_type.starts_with("video/") {
            Self::Video
        } else if content_type.starts_with("audio/") {
            Self::Audio
        } else if content_type.contains("pdf") {
            Self::Document
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "document" => Ok(Self::Document),
            "other" => Ok(Self::Other),
            other => Err(MetadataError::Corrupt(format!("unknown file type {other:?}"))),
        }
    }
}

/// Durable record of an uploaded file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub owner_id: String,
    pub display_name: String,
    pub content_type: String,
    pub size: u64,
    /// Key of the bytes in the blob store; equal to `id`
    pub blob_key: String,
    pub uploaded_at: DateTime<Utc>,
    /// `None` while the file is active
    pub deleted_at: Option<DateTime<Utc>>,
    pub file_type: FileType,
}

impl FileRecord {
    pub fn new(
        id: FileId,
        owner_id: impl Into<String>,
        display_name: impl Into<String>,
        content_type: impl Into<String>,
        size: u64,
    ) -> Self {
        let content_type = content_type.into();
        Self {
            blob_key: id.0.clone(),
            id,
            owner_id: owner_id.into(),
            display_name: display_name.into(),
            file_type: FileType::derive(&content_type),
            content_type,
            size,
            uploaded_at: Utc::now(),
            deleted_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Job status lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to be claimed
    Pending,
    /// Claimed by a worker
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(MetadataError::Corrupt(format!("unknown job status {other:?}"))),
        }
    }
}

/// Blob keys of the derived thumbnails
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailKeys {
    pub small: Option<String>,
    pub medium: Option<String>,
    pub large: Option<String>,
}

impl ThumbnailKeys {
    pub fn is_empty(&self) -> bool {
        self.small.is_none() && self.medium.is_none() && self.large.is_none()
    }

    /// Every key that is set.
    pub fn keys(&self) -> Vec<&str> {
        [&self.small, &self.medium, &self.large]
            .into_iter()
            .filter_map(|k| k.as_deref())
            .collect()
    }
}

/// What a successful job records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCompletion {
    pub thumbnails: ThumbnailKeys,
    pub original_width: Option<u32>,
    pub original_height: Option<u32>,
}

impl JobCompletion {
    /// Completion with no derived artifacts (non-image pass-through).
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Post-processing job for one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: JobId,
    pub file_id: FileId,
    pub status: JobStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    pub thumbnails: ThumbnailKeys,
    pub original_width: Option<u32>,
    pub original_height: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProcessingJob {
    /// Create a pending job record
    pub fn new(id: JobId, file_id: FileId, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            id,
            file_id,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries,
            error_message: None,
            thumbnails: ThumbnailKeys::default(),
            original_width: None,
            original_height: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Eligible for claiming: pending with attempts left
    pub fn is_eligible(&self) -> bool {
        self.status == JobStatus::Pending && self.retry_count < self.max_retries
    }

    /// Claimed by a worker
    pub fn start_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.updated_at = Utc::now();
    }

    /// Set status, recording a message when given
    pub fn update_status(&mut self, status: JobStatus, message: Option<&str>) {
        self.status = status;
        if let Some(message) = message {
            self.error_message = Some(message.to_string());
        }
        self.updated_at = Utc::now();
    }

    /// Complete the job successfully
    pub fn complete(&mut self, completion: &JobCompletion) {
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.thumbnails = completion.thumbnails.clone();
        self.original_width = completion.original_width;
        self.original_height = completion.original_height;
        self.error_message = None;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Record a failed attempt. Retryable failures go back to pending while
    /// attempts remain; everything else is terminal.
    pub fn fail(&mut self, message: &str, retryable: bool) -> JobStatus {
        if retryable {
            self.retry_count += 1;
        }
        self.status = if retryable && self.retry_count < self.max_retries {
            JobStatus::Pending
        } else {
            JobStatus::Failed
        };
        self.error_message = Some(message.to_string());
        self.updated_at = Utc::now();
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_follows_content_type() {
        assert_eq!(FileType::derive("image/png"), FileType::Image);
        assert_eq!(FileType::derive("video/mp4"), FileType::Video);
        assert_eq!(FileType::derive("audio/mpeg"), FileType::Audio);
        assert_eq!(FileType::derive("application/pdf"), FileType::Document);
        assert_eq!(FileType::derive("text/plain"), FileType::Other);
        assert_eq!(FileType::derive("IMAGE/JPEG"), FileType::Image);
    }

    #[test]
    fn blob_key_equals_id() {
        let id = FileId::new();
        let record = FileRecord::new(id.clone(), "user-1", "a.txt", "text/plain", 23);
        assert_eq!(record.blob_key, id.as_str());
        assert!(record.is_active());
        assert_eq!(record.file_type, FileType::Other);
    }

    #[test]
    fn retryable_failures_requeue_until_exhausted() {
        let mut job = ProcessingJob::new(JobId(1), FileId::new(), 3);
        job.start_processing();

        assert_eq!(job.fail("disk hiccup", true), JobStatus::Pending);
        assert!(job.is_eligible());
        assert_eq!(job.fail("disk hiccup", true), JobStatus::Pending);
        assert_eq!(job.fail("disk hiccup", true), JobStatus::Failed);
        assert_eq!(job.retry_count, 3);
        assert!(!job.is_eligible());
    }

    #[test]
    fn permanent_failures_are_terminal() {
        let mut job = ProcessingJob::new(JobId(1), FileId::new(), 3);
        assert_eq!(job.fail("File not found", false), JobStatus::Failed);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.error_message.as_deref(), Some("File not found"));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [JobStatus::Pending, JobStatus::Processing, JobStatus::Completed, JobStatus::Failed] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("queued".parse::<JobStatus>().is_err());
    }
}
