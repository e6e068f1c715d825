use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};

use uploadstream_blob::{BlobStore, MemoryBlobStore};
use uploadstream_metadata::{
    FileId, FileRecord, JobCompletion, JobStatus, MemoryMetadataStore, MetadataStore,
};
use uploadstream_queue::{
    DerivativeProcessor, JobError, JobNotifier, JobScheduler, SchedulerConfig, ThumbnailProcessor,
    TickOutcome, FILE_NOT_FOUND_MESSAGE,
};

/// Test factory functions
fn scheduler_with(
    metadata: &MemoryMetadataStore,
    processor: Arc<dyn DerivativeProcessor>,
    config: SchedulerConfig,
) -> Arc<JobScheduler> {
    Arc::new(JobScheduler::new(
        Arc::new(metadata.clone()),
        processor,
        JobNotifier::new(),
        config,
    ))
}

fn thumbnail_scheduler(metadata: &MemoryMetadataStore, blobs: &MemoryBlobStore) -> Arc<JobScheduler> {
    scheduler_with(
        metadata,
        Arc::new(ThumbnailProcessor::new(Arc::new(blobs.clone()))),
        SchedulerConfig::default(),
    )
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, _| Rgb([(x % 256) as u8, 64, 192]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

async fn committed_file(
    metadata: &MemoryMetadataStore,
    blobs: &MemoryBlobStore,
    content_type: &str,
    bytes: &[u8],
) -> FileRecord {
    let record = FileRecord::new(FileId::new(), "alice", "upload", content_type, bytes.len() as u64);
    blobs.put_bytes(&record.blob_key, bytes).await.unwrap();
    metadata.save_file(&record).await.unwrap();
    metadata.create_job(&record.id).await.unwrap();
    record
}

struct FlakyProcessor {
    calls: AtomicUsize,
    error: JobError,
}

#[async_trait]
impl DerivativeProcessor for FlakyProcessor {
    async fn process(&self, _file: &FileRecord) -> Result<JobCompletion, JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// S1. Non-Image Files Pass Through
#[tokio::test]
async fn test_text_upload_completes_without_thumbnails() {
    let metadata = MemoryMetadataStore::new();
    let blobs = MemoryBlobStore::new();
    let scheduler = thumbnail_scheduler(&metadata, &blobs);

    // Arrange: a committed 23-byte text upload
    let file = committed_file(&metadata, &blobs, "text/plain", b"hello, streaming world!").await;
    assert_eq!(file.size, 23);

    // Act
    let outcome = scheduler.tick().await.unwrap();

    // Assert: completed, nothing derived
    assert_eq!(outcome, TickOutcome::PassedThrough);
    let job = metadata.get_job_by_file(&file.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.thumbnails.is_empty());
    assert_eq!(job.original_width, None);
    assert_eq!(blobs.len(), 1);
}

/// S2. Images Get Three Thumbnails
#[tokio::test]
async fn test_image_job_records_thumbnails() {
    let metadata = MemoryMetadataStore::new();
    let blobs = MemoryBlobStore::new();
    let scheduler = thumbnail_scheduler(&metadata, &blobs);

    let file = committed_file(&metadata, &blobs, "image/png", &png(800, 400)).await;

    assert_eq!(scheduler.tick().await.unwrap(), TickOutcome::Completed);

    let job = metadata.get_job_by_file(&file.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!((job.original_width, job.original_height), (Some(800), Some(400)));
    for key in job.thumbnails.keys() {
        assert!(blobs.contains(key), "thumbnail {key} missing");
    }
    assert_eq!(job.thumbnails.keys().len(), 3);
}

/// S3. Missing File Record Fails Without Retry
#[tokio::test]
async fn test_missing_file_fails_permanently() {
    let metadata = MemoryMetadataStore::new();
    let blobs = MemoryBlobStore::new();
    let scheduler = thumbnail_scheduler(&metadata, &blobs);

    let job_id = metadata.create_job(&FileId::new()).await.unwrap();

    assert_eq!(scheduler.tick().await.unwrap(), TickOutcome::Failed);

    let job = metadata.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some(FILE_NOT_FOUND_MESSAGE));
    assert_eq!(job.retry_count, 0);
    assert_eq!(scheduler.tick().await.unwrap(), TickOutcome::Idle);
}

/// S4. Retryable Failures Requeue Until Attempts Run Out
#[tokio::test]
async fn test_retryable_failures_exhaust_attempts() {
    let metadata = MemoryMetadataStore::with_max_retries(3);
    let blobs = MemoryBlobStore::new();
    let processor = Arc::new(FlakyProcessor {
        calls: AtomicUsize::new(0),
        error: JobError::retryable("blob store unavailable"),
    });
    let scheduler = scheduler_with(&metadata, processor.clone(), SchedulerConfig::default());

    let file = committed_file(&metadata, &blobs, "image/png", &png(10, 10)).await;

    assert_eq!(scheduler.tick().await.unwrap(), TickOutcome::Requeued);
    assert_eq!(scheduler.tick().await.unwrap(), TickOutcome::Requeued);
    assert_eq!(scheduler.tick().await.unwrap(), TickOutcome::Failed);
    assert_eq!(scheduler.tick().await.unwrap(), TickOutcome::Idle);

    let job = metadata.get_job_by_file(&file.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 3);
    assert_eq!(processor.calls.load(Ordering::SeqCst), 3);
}

/// S5. Permanent Failures Do Not Retry
#[tokio::test]
async fn test_permanent_failure_is_terminal() {
    let metadata = MemoryMetadataStore::new();
    let blobs = MemoryBlobStore::new();
    let processor = Arc::new(FlakyProcessor {
        calls: AtomicUsize::new(0),
        error: JobError::permanent("decode image: unsupported format"),
    });
    let scheduler = scheduler_with(&metadata, processor.clone(), SchedulerConfig::default());

    let file = committed_file(&metadata, &blobs, "image/png", b"not an image").await;

    assert_eq!(scheduler.tick().await.unwrap(), TickOutcome::Failed);
    assert_eq!(scheduler.tick().await.unwrap(), TickOutcome::Idle);

    let job = metadata.get_job_by_file(&file.id).await.unwrap().unwrap();
    assert_eq!(job.error_message.as_deref(), Some("decode image: unsupported format"));
    assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
}

/// S6. Notifier Wakes The Loop Before The Poll Interval
#[tokio::test]
async fn test_notifier_wakes_the_background_loop() {
    let metadata = MemoryMetadataStore::new();
    let blobs = MemoryBlobStore::new();
    let scheduler = scheduler_with(
        &metadata,
        Arc::new(ThumbnailProcessor::new(Arc::new(blobs.clone()))),
        SchedulerConfig::default().with_poll_interval(Duration::from_secs(3600)),
    );
    let notifier = scheduler.notifier().clone();
    let handle = Arc::clone(&scheduler).spawn();

    let file = committed_file(&metadata, &blobs, "text/plain", b"wake up").await;
    notifier.notify();

    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let job = metadata.get_job_by_file(&file.id).await.unwrap().unwrap();
            if job.status == JobStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    assert!(completed.is_ok(), "job was not processed after notify");
    handle.shutdown().await.unwrap();
}

/// S7. Shutdown Stops Future Ticks
#[tokio::test]
async fn test_shutdown_stops_future_ticks() {
    let metadata = MemoryMetadataStore::new();
    let blobs = MemoryBlobStore::new();
    let scheduler = scheduler_with(
        &metadata,
        Arc::new(ThumbnailProcessor::new(Arc::new(blobs.clone()))),
        SchedulerConfig::default().with_poll_interval(Duration::from_millis(20)),
    );
    let handle = Arc::clone(&scheduler).spawn();
    handle.shutdown().await.unwrap();

    let file = committed_file(&metadata, &blobs, "text/plain", b"too late").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let job = metadata.get_job_by_file(&file.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
}
