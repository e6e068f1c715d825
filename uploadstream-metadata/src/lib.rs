//! # uploadstream-metadata
//!
//! Durable records for UploadStream: one [`FileRecord`] per committed upload
//! and one [`ProcessingJob`] per derived-artifact run.
//!
//! Both the request path and the job scheduler talk to storage only through
//! the [`MetadataStore`] trait. Its [`MetadataStore::claim_next_job`] is the
//! one cross-process concurrency primitive in the system: a pending job is
//! handed to exactly one claimant, whichever backend is in use.
//!
//! ## Backends
//!
//! - [`MemoryMetadataStore`]: single lock, used by tests and local runs
//! - `PgMetadataStore` (feature `postgres`): `FOR UPDATE SKIP LOCKED` claim
//!
//! ## Job lifecycle
//!
//! ```text
//! pending --claim--> processing --complete--> completed
//!    ^                   |
//!    +--retryable fail---+--permanent fail / attempts exhausted--> failed
//! ```

mod error;
mod memory;
mod model;
mod store;

#[cfg(feature = "postgres")]
mod postgres;

pub use error::{MetadataError, MetadataResult};
pub use memory::{FailPoint, MemoryMetadataStore};
pub use model::{
    FileId, FileRecord, FileType, JobCompletion, JobId, JobStatus, ProcessingJob, ThumbnailKeys,
    DEFAULT_MAX_RETRIES,
};
pub use store::{MetadataStore, STALE_JOB_MESSAGE};

#[cfg(feature = "postgres")]
pub use postgres::PgMetadataStore;
