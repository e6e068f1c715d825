use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uploadstream_service::{CredentialProvider, FileService, TransferHandler};

/// Everything a request handler needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub transfer: Arc<TransferHandler>,
    pub files: Arc<FileService>,
    pub credentials: Arc<dyn CredentialProvider>,
    /// Cancelled on shutdown; every transfer runs under a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        transfer: Arc<TransferHandler>,
        files: Arc<FileService>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            transfer,
            files,
            credentials,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}
