use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use uploadstream_metadata::{FileRecord, FileType, JobStatus, ProcessingJob};

/// Describes the upload that follows. Always the first message of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub display_name: String,
    pub content_type: String,
    pub size: u64,
    pub owner_id: String,
}

impl UploadMetadata {
    pub fn new(
        display_name: impl Into<String>,
        content_type: impl Into<String>,
        size: u64,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            content_type: content_type.into(),
            size,
            owner_id: owner_id.into(),
        }
    }
}

/// One inbound message of an upload stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadMessage {
    Metadata(UploadMetadata),
    Chunk(Bytes),
}

impl UploadMessage {
    pub fn chunk(data: impl Into<Bytes>) -> Self {
        Self::Chunk(data.into())
    }
}

/// Response to a committed upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub id: String,
    pub display_name: String,
    pub size: u64,
    pub job_status: JobStatus,
}

/// Sent once, before any chunk of a download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: String,
    pub display_name: String,
    pub content_type: String,
    pub size: u64,
}

impl From<&FileRecord> for FileInfo {
    fn from(record: &FileRecord) -> Self {
        Self {
            id: record.id.to_string(),
            display_name: record.display_name.clone(),
            content_type: record.content_type.clone(),
            size: record.size,
        }
    }
}

/// One outbound message of a download stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadMessage {
    Info(FileInfo),
    Chunk(Bytes),
}

/// Derived result of a file's processing job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProcessingResult {
    Thumbnails {
        thumbnail_small: Option<String>,
        thumbnail_medium: Option<String>,
        thumbnail_large: Option<String>,
        original_width: Option<u32>,
        original_height: Option<u32>,
    },
    Error {
        error_message: String,
    },
}

impl ProcessingResult {
    /// Result worth reporting for `job`: artifacts once completed, the error
    /// once failed, nothing while in flight.
    pub fn from_job(job: &ProcessingJob) -> Option<Self> {
        match job.status {
            JobStatus::Completed => Some(Self::Thumbnails {
                thumbnail_small: job.thumbnails.small.clone(),
                thumbnail_medium: job.thumbnails.medium.clone(),
                thumbnail_large: job.thumbnails.large.clone(),
                original_width: job.original_width,
                original_height: job.original_height,
            }),
            JobStatus::Failed => Some(Self::Error {
                error_message: job.error_message.clone().unwrap_or_default(),
            }),
            JobStatus::Pending | JobStatus::Processing => None,
        }
    }
}

/// Full metadata of one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: String,
    pub display_name: String,
    pub content_type: String,
    pub size: u64,
    pub file_type: FileType,
    pub uploaded_at: DateTime<Utc>,
    pub job_status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ProcessingResult>,
}

/// One row of a file listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub id: String,
    pub display_name: String,
    pub content_type: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub job_status: JobStatus,
}

/// A page of files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileList {
    pub files: Vec<FileEntry>,
    /// Empty when this is the last page
    pub next_page_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub success: bool,
    pub message: String,
}
