use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Span};

use uploadstream_blob::{BlobStore, BlobWriter};
use uploadstream_core::{FileError, FileResult};
use uploadstream_metadata::{FileId, FileRecord, JobStatus, MetadataStore};
use uploadstream_queue::JobNotifier;

use crate::files::load_file;
use crate::validator::validate_metadata;
use crate::{
    AdmissionGate, ContentValidator, DownloadMessage, FileInfo, TransferConfig, UploadMessage, UploadMetadata,
    UploadReceipt,
};

/// Outbound half of a download: one [`DownloadMessage::Info`], then chunks.
pub type DownloadStream = Pin<Box<dyn Stream<Item = FileResult<DownloadMessage>> + Send>>;

/// Upload and download state machines.
///
/// An upload moves through `AwaitingMetadata -> Receiving -> Finalizing` and
/// ends either committed (blob + file record + best-effort job) or aborted
/// with nothing left in the blob store. Uploads hold a slot of the
/// [`AdmissionGate`] for their whole lifetime.
pub struct TransferHandler {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    validator: ContentValidator,
    gate: AdmissionGate,
    notifier: Option<JobNotifier>,
    config: TransferConfig,
}

impl TransferHandler {
    pub fn new(blobs: Arc<dyn BlobStore>, metadata: Arc<dyn MetadataStore>, config: TransferConfig) -> Self {
        Self {
            blobs,
            metadata,
            validator: ContentValidator::default(),
            gate: AdmissionGate::new(config.max_concurrent_uploads),
            notifier: None,
            config,
        }
    }

    pub fn with_validator(mut self, validator: ContentValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Wake `notifier` whenever an upload creates a job.
    pub fn with_notifier(mut self, notifier: JobNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Run one upload to completion.
    ///
    /// `messages` yields the metadata message and then the chunks; an `Err`
    /// item is a transport read failure. `cancel` aborts the upload between
    /// messages.
    #[instrument(skip_all, fields(file_id = tracing::field::Empty))]
    pub async fn upload<S, E>(&self, messages: S, cancel: CancellationToken) -> FileResult<UploadReceipt>
    where
        S: Stream<Item = Result<UploadMessage, E>> + Send,
        E: Display + Send,
    {
        let _permit = self.gate.try_acquire()?;
        tokio::pin!(messages);

        let metadata = self.receive_metadata(messages.as_mut(), &cancel).await?;

        let file_id = FileId::new();
        Span::current().record("file_id", tracing::field::display(&file_id));
        debug!(
            "Receiving {} ({}, {} bytes) for {}",
            metadata.display_name, metadata.content_type, metadata.size, metadata.owner_id
        );

        let mut writer = self
            .blobs
            .create(file_id.as_str())
            .await
            .map_err(|e| FileError::internal("failed to create file").with_source(e))?;
        let guard = BlobGuard::new(Arc::clone(&self.blobs), file_id.as_str());

        let received = match self
            .receive_chunks(messages.as_mut(), &mut writer, &metadata, &cancel)
            .await
        {
            Ok(received) => received,
            Err(err) => {
                debug!("Upload aborted: {}", err);
                drop(writer);
                guard.discard().await;
                return Err(err);
            }
        };

        if let Err(e) = writer.shutdown().await {
            drop(writer);
            guard.discard().await;
            return Err(FileError::internal("failed to finish file").with_source(e));
        }
        drop(writer);

        let record = FileRecord::new(
            file_id.clone(),
            metadata.owner_id,
            metadata.display_name,
            metadata.content_type,
            received,
        );
        if let Err(e) = self.metadata.save_file(&record).await {
            error!("Failed to save file metadata: {}", e);
            guard.discard().await;
            return Err(FileError::internal("failed to save file metadata").with_source(e));
        }
        guard.commit();

        match self.metadata.create_job(&file_id).await {
            Ok(job_id) => {
                debug!("Created processing job {}", job_id);
                if let Some(notifier) = &self.notifier {
                    notifier.notify();
                }
            }
            Err(e) => warn!("Failed to create processing job, leaving it to recovery: {}", e),
        }

        info!("Upload committed: {} bytes", received);
        Ok(UploadReceipt {
            id: file_id.to_string(),
            display_name: record.display_name,
            size: received,
            job_status: JobStatus::Pending,
        })
    }

    async fn receive_metadata<S, E>(
        &self,
        mut messages: Pin<&mut S>,
        cancel: &CancellationToken,
    ) -> FileResult<UploadMetadata>
    where
        S: Stream<Item = Result<UploadMessage, E>> + Send,
        E: Display + Send,
    {
        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FileError::canceled("upload canceled")),
            first = messages.next() => first,
        };

        let metadata = match first {
            Some(Ok(UploadMessage::Metadata(metadata))) => metadata,
            Some(Ok(UploadMessage::Chunk(_))) => {
                return Err(FileError::invalid_argument("first message must be metadata"))
            }
            Some(Err(e)) => return Err(FileError::invalid_argument(format!("no metadata received: {e}"))),
            None => return Err(FileError::invalid_argument("no metadata received")),
        };

        validate_metadata(&metadata, self.config.max_file_bytes)?;
        Ok(metadata)
    }

    /// Write chunks until the stream ends. Returns the number of bytes written,
    /// which always equals the declared size.
    async fn receive_chunks<S, E>(
        &self,
        mut messages: Pin<&mut S>,
        writer: &mut BlobWriter,
        metadata: &UploadMetadata,
        cancel: &CancellationToken,
    ) -> FileResult<u64>
    where
        S: Stream<Item = Result<UploadMessage, E>> + Send,
        E: Display + Send,
    {
        let declared = metadata.size;
        let mut total: u64 = 0;
        // Leading bytes still waiting for the sniffer; `None` once checked.
        let mut prefix: Option<Vec<u8>> = Some(Vec::with_capacity(self.config.sniff_bytes));

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FileError::canceled("upload canceled")),
                next = messages.next() => next,
            };

            let chunk: Bytes = match next {
                None => break,
                Some(Ok(UploadMessage::Chunk(chunk))) => chunk,
                Some(Ok(UploadMessage::Metadata(_))) => {
                    return Err(FileError::invalid_argument("metadata may only be sent once"))
                }
                Some(Err(e)) => return Err(FileError::internal(format!("failed to receive chunk: {e}"))),
            };

            if chunk.is_empty() {
                continue;
            }
            if chunk.len() > self.config.max_chunk_bytes {
                return Err(FileError::invalid_argument(format!(
                    "chunk too large: {} bytes (max {})",
                    chunk.len(),
                    self.config.max_chunk_bytes
                )));
            }

            let after = total + chunk.len() as u64;
            if after > declared {
                return Err(FileError::invalid_argument(format!(
                    "received {after} bytes, expected {declared}"
                )));
            }

            if let Some(buffered) = prefix.as_mut() {
                let wanted = self.config.sniff_bytes.saturating_sub(buffered.len());
                buffered.extend_from_slice(&chunk[..wanted.min(chunk.len())]);
                if buffered.len() >= self.config.sniff_bytes || after == declared {
                    self.validator.validate(buffered, &metadata.content_type)?;
                    prefix = None;
                }
            }

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| FileError::internal("failed to write chunk").with_source(e))?;
            total = after;
        }

        if total != declared {
            return Err(FileError::invalid_argument(format!(
                "size mismatch: received {total} bytes, expected {declared}"
            )));
        }
        Ok(total)
    }

    /// Open a download of `file_id`.
    ///
    /// Lookup errors are returned directly; everything after that, a missing
    /// blob included, arrives as an `Err` item on the stream.
    #[instrument(skip(self, cancel))]
    pub async fn download(&self, file_id: &str, cancel: CancellationToken) -> FileResult<DownloadStream> {
        let record = load_file(self.metadata.as_ref(), file_id).await?;
        let info = FileInfo::from(&record);
        let blobs = Arc::clone(&self.blobs);
        let blob_key = record.blob_key;
        let chunk_bytes = self.config.download_chunk_bytes;

        let stream = async_stream::stream! {
            yield Ok(DownloadMessage::Info(info));

            let mut reader = match blobs.open(&blob_key).await {
                Ok(reader) => reader,
                Err(e) => {
                    error!("File {} has a record but no readable blob: {}", blob_key, e);
                    yield Err(FileError::internal("failed to open file").with_source(e));
                    return;
                }
            };

            let mut buf = vec![0u8; chunk_bytes];
            loop {
                let read = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    read = reader.read(&mut buf) => Some(read),
                };

                match read {
                    None => {
                        debug!("Download of {} canceled", blob_key);
                        yield Err(FileError::canceled("download canceled"));
                        return;
                    }
                    Some(Ok(0)) => return,
                    Some(Ok(n)) => {
                        yield Ok(DownloadMessage::Chunk(Bytes::copy_from_slice(&buf[..n])));
                    }
                    Some(Err(e)) => {
                        yield Err(FileError::internal("failed to read file").with_source(e));
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Deletes a partially written blob unless the upload commits.
///
/// Error paths call [`BlobGuard::discard`]. If the upload future is dropped
/// instead (client gone), `Drop` schedules the delete on the runtime.
struct BlobGuard {
    blobs: Arc<dyn BlobStore>,
    id: String,
    armed: bool,
}

impl BlobGuard {
    fn new(blobs: Arc<dyn BlobStore>, id: &str) -> Self {
        Self {
            blobs,
            id: id.to_string(),
            armed: true,
        }
    }

    fn commit(mut self) {
        self.armed = false;
    }

    async fn discard(mut self) {
        self.armed = false;
        remove_partial(self.blobs.as_ref(), &self.id).await;
    }
}

impl Drop for BlobGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let blobs = Arc::clone(&self.blobs);
        let id = std::mem::take(&mut self.id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { remove_partial(blobs.as_ref(), &id).await });
            }
            Err(_) => warn!("No runtime available to remove abandoned blob {}", id),
        }
    }
}

async fn remove_partial(blobs: &dyn BlobStore, id: &str) {
    match blobs.delete(id).await {
        Ok(()) => debug!("Removed partial blob {}", id),
        Err(e) if e.is_not_found() => {}
        Err(e) => warn!("Failed to remove partial blob {}: {}", id, e),
    }
}
