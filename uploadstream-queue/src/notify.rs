use std::sync::Arc;

use tokio::sync::Notify;

/// Wakes the scheduler as soon as a job is created instead of waiting for
/// the next poll. Clones share one signal.
#[derive(Debug, Clone, Default)]
pub struct JobNotifier {
    inner: Arc<Notify>,
}

impl JobNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that a job is waiting. Signals sent while nobody waits are
    /// coalesced into one wake-up.
    pub fn notify(&self) {
        self.inner.notify_one();
    }

    /// Resolves on the next signal.
    pub async fn notified(&self) {
        self.inner.notified().await;
    }
}
