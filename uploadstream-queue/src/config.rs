use std::time::Duration;

use uploadstream_core::Settings;

/// Configuration for the job scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the worker looks for a job when nothing wakes it
    pub poll_interval: Duration,
    /// A `processing` job untouched this long is treated as abandoned
    pub stale_after: Duration,
    /// Run the recovery pass every this many ticks (0 disables it)
    pub reaper_every_ticks: u64,
    /// Most orphaned files re-enqueued per recovery pass
    pub orphan_batch: usize,
    /// Whether the binary starts a worker at all
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            stale_after: Duration::from_secs(600),
            reaper_every_ticks: 30,
            orphan_batch: 100,
            enabled: true,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_reaper_every_ticks(mut self, ticks: u64) -> Self {
        self.reaper_every_ticks = ticks;
        self
    }

    /// Read `worker.*` keys, falling back to defaults.
    pub fn from_settings(settings: &Settings) -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: settings
                .get_duration_millis("worker.poll_interval_ms")
                .unwrap_or(defaults.poll_interval),
            stale_after: settings
                .get_duration_secs("worker.stale_after_secs")
                .unwrap_or(defaults.stale_after),
            reaper_every_ticks: settings
                .get_u64("worker.reaper_every_ticks")
                .unwrap_or(defaults.reaper_every_ticks),
            orphan_batch: settings
                .get_usize("worker.orphan_batch")
                .unwrap_or(defaults.orphan_batch),
            enabled: settings.get_bool("worker.enabled").unwrap_or(defaults.enabled),
        }
    }
}

/// Thumbnail widths and encoding
#[derive(Debug, Clone)]
pub struct ThumbnailConfig {
    pub small_width: u32,
    pub medium_width: u32,
    pub large_width: u32,
    pub jpeg_quality: u8,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            small_width: 150,
            medium_width: 400,
            large_width: 500,
            jpeg_quality: 85,
        }
    }
}

impl ThumbnailConfig {
    /// Read `thumbnail.*` keys, falling back to defaults.
    pub fn from_settings(settings: &Settings) -> Self {
        let defaults = Self::default();
        Self {
            small_width: settings.get_u32("thumbnail.small_width").unwrap_or(defaults.small_width),
            medium_width: settings.get_u32("thumbnail.medium_width").unwrap_or(defaults.medium_width),
            large_width: settings.get_u32("thumbnail.large_width").unwrap_or(defaults.large_width),
            jpeg_quality: settings
                .get_u32("thumbnail.jpeg_quality")
                .and_then(|q| u8::try_from(q).ok())
                .filter(|q| (1..=100).contains(q))
                .unwrap_or(defaults.jpeg_quality),
        }
    }
}
