use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{BlobError, BlobResult};

/// Writable handle to a blob. The blob is complete once the writer has been
/// shut down (`AsyncWriteExt::shutdown`), which also flushes buffered bytes.
pub type BlobWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Readable handle to a blob.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Byte storage addressed by an opaque id. Implementations must be safe for
/// concurrent use; the namespace is flat.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create (or truncate) the blob `id` and return a writer for it.
    async fn create(&self, id: &str) -> BlobResult<BlobWriter>;

    /// Open the blob `id` for reading. Missing blobs are [`BlobError::NotFound`].
    async fn open(&self, id: &str) -> BlobResult<BlobReader>;

    /// Delete the blob `id`. Missing blobs are [`BlobError::NotFound`].
    async fn delete(&self, id: &str) -> BlobResult<()>;

    /// Whether the blob `id` exists.
    async fn exists(&self, id: &str) -> BlobResult<bool>;

    /// Write a whole blob in one call.
    async fn put_bytes(&self, id: &str, bytes: &[u8]) -> BlobResult<()> {
        let mut writer = self.create(id).await?;
        writer.write_all(bytes).await?;
        writer.shutdown().await?;
        Ok(())
    }

    /// Read a whole blob into memory.
    async fn read_to_vec(&self, id: &str) -> BlobResult<Vec<u8>> {
        let mut reader = self.open(id).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }
}

/// Reject keys that could escape a flat namespace.
pub fn validate_key(id: &str) -> BlobResult<()> {
    if id.is_empty() {
        return Err(BlobError::invalid("key is empty"));
    }
    if id == "." || id == ".." || id.contains('/') || id.contains('\\') || id.contains('\0') {
        return Err(BlobError::invalid(format!("key {id:?} is not a single path component")));
    }
    Ok(())
}
