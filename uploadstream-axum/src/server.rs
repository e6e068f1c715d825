use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use uploadstream_blob::{BlobStore, FsBlobConfig, FsBlobStore};
use uploadstream_core::Settings;
use uploadstream_metadata::{MemoryMetadataStore, MetadataStore};
use uploadstream_queue::{
    JobNotifier, JobScheduler, SchedulerConfig, SchedulerHandle, ThumbnailConfig, ThumbnailProcessor,
};
use uploadstream_service::{FileService, ListConfig, StaticCredentials, TransferConfig, TransferHandler};

use crate::{AppState, HttpApp, HttpConfig};

/// A fully wired process: stores, scheduler and HTTP app.
pub struct Server {
    pub app: HttpApp,
    pub http: HttpConfig,
    scheduler: Option<Arc<JobScheduler>>,
}

impl Server {
    /// Build every component from `settings`.
    pub async fn build(settings: &Settings) -> Result<Self> {
        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(FsBlobConfig::from_settings(settings)).await?);
        let metadata = metadata_store(settings).await?;
        let notifier = JobNotifier::new();

        let transfer = TransferHandler::new(
            Arc::clone(&blobs),
            Arc::clone(&metadata),
            TransferConfig::from_settings(settings),
        )
        .with_notifier(notifier.clone());
        let files = FileService::new(Arc::clone(&blobs), Arc::clone(&metadata), ListConfig::from_settings(settings));

        let credentials = StaticCredentials::from_settings(settings);
        if credentials.is_empty() {
            warn!("No API keys configured (auth.api_keys); every request will be rejected");
        }

        let scheduler_config = SchedulerConfig::from_settings(settings);
        let enabled = scheduler_config.enabled;
        let scheduler = enabled.then(|| {
            let processor =
                ThumbnailProcessor::with_config(Arc::clone(&blobs), ThumbnailConfig::from_settings(settings));
            Arc::new(JobScheduler::new(
                Arc::clone(&metadata),
                Arc::new(processor),
                notifier,
                scheduler_config,
            ))
        });

        let state = AppState::new(Arc::new(transfer), Arc::new(files), Arc::new(credentials));
        Ok(Self {
            app: HttpApp::new(state),
            http: HttpConfig::from_settings(settings),
            scheduler,
        })
    }

    /// Token that stops the server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.app.state.shutdown.clone()
    }

    /// Serve until shutdown, then stop the scheduler.
    pub async fn run(self) -> Result<()> {
        let handle: Option<SchedulerHandle> = self.scheduler.map(JobScheduler::spawn);
        if handle.is_none() {
            info!("Job scheduler disabled (worker.enabled=false)");
        }

        let served = self.app.listen(self.http.addr()).await;

        if let Some(handle) = handle {
            handle.shutdown().await?;
        }
        served
    }
}

#[cfg(feature = "postgres")]
async fn metadata_store(settings: &Settings) -> Result<Arc<dyn MetadataStore>> {
    use uploadstream_metadata::PgMetadataStore;

    if let Some(url) = settings.get("database.url") {
        let max_connections = settings.get_u32("database.max_connections").unwrap_or(10);
        let store = PgMetadataStore::connect(url, max_connections).await?;
        info!("Using PostgreSQL metadata store");
        return Ok(Arc::new(store));
    }
    warn!("database.url is not set; metadata is kept in memory");
    Ok(Arc::new(MemoryMetadataStore::new()))
}

#[cfg(not(feature = "postgres"))]
async fn metadata_store(settings: &Settings) -> Result<Arc<dyn MetadataStore>> {
    if settings.has("database.url") {
        warn!("database.url is set but this build has no postgres support; metadata is kept in memory");
    }
    Ok(Arc::new(MemoryMetadataStore::new()))
}
