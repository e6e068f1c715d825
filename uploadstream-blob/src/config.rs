use std::path::PathBuf;

use uploadstream_core::Settings;

/// Configuration for the filesystem blob store
#[derive(Debug, Clone)]
pub struct FsBlobConfig {
    /// Directory every blob is written into
    pub root: PathBuf,
}

impl Default for FsBlobConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/files"),
        }
    }
}

impl FsBlobConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the storage root
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Read `blob.root`, falling back to defaults.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut config = Self::default();
        if let Some(root) = settings.get_string("blob.root") {
            config.root = PathBuf::from(root);
        }
        config
    }
}
