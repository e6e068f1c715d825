use thiserror::Error;
use uploadstream_blob::BlobError;
use uploadstream_metadata::MetadataError;

/// Result type for scheduler operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Infrastructure errors raised while driving jobs
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Metadata store error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Job execution outcome - determines retry behavior
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Retryable error - the job goes back to pending if attempts remain
    #[error("Retryable error: {0}")]
    Retryable(String),

    /// Permanent error - fail immediately, no retry
    #[error("Permanent error: {0}")]
    Permanent(String),
}

impl JobError {
    /// Create a retryable error
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    /// Create a permanent error
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Permanent(msg) => msg,
        }
    }
}

impl From<BlobError> for JobError {
    /// A missing blob will not reappear on retry; other storage errors might clear.
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound { .. } | BlobError::Invalid { .. } => Self::permanent(err.to_string()),
            other => Self::retryable(other.to_string()),
        }
    }
}
