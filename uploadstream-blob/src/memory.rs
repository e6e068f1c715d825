use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::io::AsyncWrite;

use crate::{validate_key, BlobError, BlobReader, BlobResult, BlobStore, BlobWriter};

type BlobMap = HashMap<String, Vec<u8>>;

/// In-memory blob store for tests and development. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<BlobMap>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a blob is present (sync helper for assertions).
    pub fn contains(&self, id: &str) -> bool {
        self.blobs.read().contains_key(id)
    }

    /// Copy of a blob's current bytes.
    pub fn get(&self, id: &str) -> Option<Vec<u8>> {
        self.blobs.read().get(id).cloned()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn create(&self, id: &str) -> BlobResult<BlobWriter> {
        validate_key(id)?;
        self.blobs.write().insert(id.to_string(), Vec::new());
        Ok(Box::pin(MemoryBlobWriter {
            id: id.to_string(),
            blobs: Arc::clone(&self.blobs),
        }))
    }

    async fn open(&self, id: &str) -> BlobResult<BlobReader> {
        validate_key(id)?;
        let bytes = self
            .blobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| BlobError::not_found(id))?;
        Ok(Box::pin(io::Cursor::new(bytes)))
    }

    async fn delete(&self, id: &str) -> BlobResult<()> {
        validate_key(id)?;
        match self.blobs.write().remove(id) {
            Some(_) => Ok(()),
            None => Err(BlobError::not_found(id)),
        }
    }

    async fn exists(&self, id: &str) -> BlobResult<bool> {
        validate_key(id)?;
        Ok(self.contains(id))
    }
}

/// Appends straight into the shared map so partially written blobs are
/// visible, the same way a half-written file is.
struct MemoryBlobWriter {
    id: String,
    blobs: Arc<RwLock<BlobMap>>,
}

impl AsyncWrite for MemoryBlobWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let mut blobs = self.blobs.write();
        match blobs.get_mut(&self.id) {
            Some(data) => {
                data.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
            None => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("blob {} was deleted while being written", self.id),
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
