use std::sync::Arc;

use tracing::{info, instrument, warn};

use uploadstream_blob::BlobStore;
use uploadstream_core::{FileError, FileResult};
use uploadstream_metadata::{FileId, FileRecord, JobStatus, MetadataStore, ProcessingJob};

use crate::{DeleteOutcome, FileEntry, FileList, FileMetadata, ListConfig, ProcessingResult};

/// Look up an active file, mapping store errors onto the request taxonomy.
pub(crate) async fn load_file(metadata: &dyn MetadataStore, file_id: &str) -> FileResult<FileRecord> {
    let file_id = file_id.trim();
    if file_id.is_empty() {
        return Err(FileError::invalid_argument("file id is required"));
    }

    metadata.get_file(&FileId::from(file_id)).await.map_err(|e| {
        if e.is_not_found() {
            FileError::not_found(format!("file not found: {file_id}"))
        } else {
            FileError::internal("failed to load file metadata").with_source(e)
        }
    })
}

/// Plain metadata queries: get, list and delete.
pub struct FileService {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    config: ListConfig,
}

impl FileService {
    pub fn new(blobs: Arc<dyn BlobStore>, metadata: Arc<dyn MetadataStore>, config: ListConfig) -> Self {
        Self {
            blobs,
            metadata,
            config,
        }
    }

    /// File details with the state of its processing job. A file without a
    /// job reports `pending`.
    #[instrument(skip(self))]
    pub async fn get_file_metadata(&self, file_id: &str) -> FileResult<FileMetadata> {
        let record = load_file(self.metadata.as_ref(), file_id).await?;
        let job = self.latest_job(&record.id).await?;

        Ok(FileMetadata {
            id: record.id.to_string(),
            display_name: record.display_name,
            content_type: record.content_type,
            size: record.size,
            file_type: record.file_type,
            uploaded_at: record.uploaded_at,
            job_status: job.as_ref().map_or(JobStatus::Pending, |j| j.status),
            result: job.as_ref().and_then(ProcessingResult::from_job),
        })
    }

    /// One page of `owner_id`'s files, newest first.
    ///
    /// `page_size <= 0` means the default. `page_token` is the token of a
    /// previous page, or empty for the first one.
    #[instrument(skip(self))]
    pub async fn list_files(&self, owner_id: &str, page_size: i64, page_token: &str) -> FileResult<FileList> {
        if owner_id.trim().is_empty() {
            return Err(FileError::invalid_argument("owner id is required"));
        }
        let limit = self.config.effective_page_size(page_size);
        let offset = parse_page_token(page_token)?;

        let mut records = self
            .metadata
            .list_files(owner_id, limit + 1, offset)
            .await
            .map_err(|e| FileError::internal("failed to list files").with_source(e))?;

        let has_more = records.len() > limit;
        records.truncate(limit);

        let mut files = Vec::with_capacity(records.len());
        for record in records {
            let job_status = self
                .latest_job(&record.id)
                .await?
                .map_or(JobStatus::Pending, |j| j.status);
            files.push(FileEntry {
                id: record.id.to_string(),
                display_name: record.display_name,
                content_type: record.content_type,
                size: record.size,
                uploaded_at: record.uploaded_at,
                job_status,
            });
        }

        Ok(FileList {
            files,
            next_page_token: if has_more {
                offset.saturating_add(limit).to_string()
            } else {
                String::new()
            },
        })
    }

    /// Soft-delete a file owned by `caller`.
    ///
    /// The blob goes first; if that fails the record is still deleted and
    /// the bytes are left for a later sweep.
    #[instrument(skip(self))]
    pub async fn delete_file(&self, file_id: &str, caller: &str) -> FileResult<DeleteOutcome> {
        let record = load_file(self.metadata.as_ref(), file_id).await?;

        if record.owner_id != caller {
            return Err(FileError::permission_denied("not the owner of this file"));
        }

        if let Err(e) = self.blobs.delete(&record.blob_key).await {
            warn!("Failed to delete blob {}, keeping the delete: {}", record.blob_key, e);
        }

        self.metadata
            .soft_delete_file(&record.id, caller)
            .await
            .map_err(|e| FileError::internal("failed to delete file metadata").with_source(e))?;

        info!("Deleted file {}", record.id);
        Ok(DeleteOutcome {
            success: true,
            message: "file deleted".to_string(),
        })
    }

    async fn latest_job(&self, file_id: &FileId) -> FileResult<Option<ProcessingJob>> {
        self.metadata
            .get_job_by_file(file_id)
            .await
            .map_err(|e| FileError::internal("failed to load processing job").with_source(e))
    }
}

fn parse_page_token(token: &str) -> FileResult<usize> {
    let token = token.trim();
    if token.is_empty() {
        return Ok(0);
    }
    // Offsets must fit a signed 64-bit OFFSET in SQL stores.
    token
        .parse::<i64>()
        .ok()
        .and_then(|offset| usize::try_from(offset).ok())
        .ok_or_else(|| FileError::invalid_argument(format!("invalid page token: {token:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_tokens_are_offsets() {
        assert_eq!(parse_page_token("").unwrap(), 0);
        assert_eq!(parse_page_token("40").unwrap(), 40);
        assert!(parse_page_token("abc").is_err());
        assert!(parse_page_token("-1").is_err());
        assert_eq!(parse_page_token(&i64::MAX.to_string()).unwrap(), i64::MAX as usize);
        assert!(parse_page_token("9223372036854775808").is_err());
        assert!(parse_page_token(&u64::MAX.to_string()).is_err());
    }
}
