use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use uploadstream_core::{FileError, FileResult};

/// Bounds the number of uploads open at once.
///
/// Admission never waits: a full gate rejects the caller immediately. The
/// returned [`UploadPermit`] frees its slot when dropped, whichever way the
/// upload ends.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    slots: Arc<Semaphore>,
    capacity: usize,
}

/// A held slot of an [`AdmissionGate`]
#[derive(Debug)]
pub struct UploadPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn try_acquire(&self) -> FileResult<UploadPermit> {
        match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(permit) => Ok(UploadPermit { _permit: permit }),
            Err(TryAcquireError::NoPermits) => Err(FileError::resource_exhausted(format!(
                "too many concurrent uploads (limit {})",
                self.capacity
            ))),
            Err(TryAcquireError::Closed) => Err(FileError::internal("upload gate is closed")),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}
