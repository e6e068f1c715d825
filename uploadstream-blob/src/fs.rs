use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::BufWriter;
use tracing::debug;

use crate::{validate_key, BlobError, BlobReader, BlobResult, BlobStore, BlobWriter, FsBlobConfig};

/// Blob store that keeps one file per blob directly under a root directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create the store, creating the root directory if needed.
    pub async fn new(config: FsBlobConfig) -> BlobResult<Self> {
        fs::create_dir_all(&config.root).await?;
        debug!("Blob root ready at {}", config.root.display());
        Ok(Self { root: config.root })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn path_for(&self, id: &str) -> BlobResult<PathBuf> {
        validate_key(id)?;
        Ok(self.root.join(id))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn create(&self, id: &str) -> BlobResult<BlobWriter> {
        let path = self.path_for(id)?;
        let file = fs::File::create(&path).await?;
        Ok(Box::pin(BufWriter::new(file)))
    }

    async fn open(&self, id: &str) -> BlobResult<BlobReader> {
        let path = self.path_for(id)?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| BlobError::from_io(id, e))?;
        Ok(Box::pin(file))
    }

    async fn delete(&self, id: &str) -> BlobResult<()> {
        let path = self.path_for(id)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| BlobError::from_io(id, e))
    }

    async fn exists(&self, id: &str) -> BlobResult<bool> {
        let path = self.path_for(id)?;
        Ok(fs::try_exists(&path).await?)
    }
}
