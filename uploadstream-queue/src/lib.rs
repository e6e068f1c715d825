//! # uploadstream-queue
//!
//! Asynchronous post-processing for committed uploads.
//!
//! A [`JobScheduler`] runs one loop per process. On every tick (a fixed poll
//! interval, or earlier when a [`JobNotifier`] fires) it claims the oldest
//! eligible job from the metadata store, resolves the file and either hands
//! it to a [`DerivativeProcessor`] (images) or completes it straight away
//! (everything else). Outcomes are recorded on the job row and never
//! surfaced to the uploader.
//!
//! Failures carry a [`JobError`]: retryable ones send the job back to
//! pending until its attempts run out, permanent ones fail it at once. A
//! periodic [`JobReaper`] pass recovers jobs abandoned by a dead worker and
//! creates jobs for files whose upload could not.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use uploadstream_blob::MemoryBlobStore;
//! use uploadstream_metadata::MemoryMetadataStore;
//! use uploadstream_queue::{JobNotifier, JobScheduler, SchedulerConfig, ThumbnailProcessor};
//!
//! # async fn demo() -> uploadstream_queue::QueueResult<()> {
//! let blobs = Arc::new(MemoryBlobStore::new());
//! let scheduler = Arc::new(JobScheduler::new(
//!     Arc::new(MemoryMetadataStore::new()),
//!     Arc::new(ThumbnailProcessor::new(blobs)),
//!     JobNotifier::new(),
//!     SchedulerConfig::default(),
//! ));
//! let handle = scheduler.spawn();
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod notify;
mod reaper;
mod scheduler;
mod thumbnail;

pub use config::{SchedulerConfig, ThumbnailConfig};
pub use error::{JobError, QueueError, QueueResult};
pub use notify::JobNotifier;
pub use reaper::{JobReaper, ReapReport};
pub use scheduler::{JobScheduler, SchedulerHandle, TickOutcome, FILE_NOT_FOUND_MESSAGE};
pub use thumbnail::{scaled_height, DerivativeProcessor, ThumbnailProcessor, ThumbnailSize};
