use uploadstream_core::limits::{
    DOWNLOAD_CHUNK_BYTES, MAX_CHUNK_BYTES, MAX_CONCURRENT_UPLOADS, MAX_FILE_BYTES, SNIFF_BYTES,
};
use uploadstream_core::Settings;

/// Limits of the upload and download streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    pub max_file_bytes: u64,
    pub max_chunk_bytes: usize,
    /// Prefix length handed to the content sniffer
    pub sniff_bytes: usize,
    /// Capacity of the upload admission gate
    pub max_concurrent_uploads: usize,
    pub download_chunk_bytes: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: MAX_FILE_BYTES,
            max_chunk_bytes: MAX_CHUNK_BYTES,
            sniff_bytes: SNIFF_BYTES,
            max_concurrent_uploads: MAX_CONCURRENT_UPLOADS,
            download_chunk_bytes: DOWNLOAD_CHUNK_BYTES,
        }
    }
}

impl TransferConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_file_bytes(mut self, bytes: u64) -> Self {
        self.max_file_bytes = bytes;
        self
    }

    pub fn with_max_chunk_bytes(mut self, bytes: usize) -> Self {
        self.max_chunk_bytes = bytes;
        self
    }

    pub fn with_max_concurrent_uploads(mut self, uploads: usize) -> Self {
        self.max_concurrent_uploads = uploads;
        self
    }

    pub fn with_download_chunk_bytes(mut self, bytes: usize) -> Self {
        self.download_chunk_bytes = bytes;
        self
    }

    /// Read `upload.*` and `download.*` keys, falling back to defaults.
    pub fn from_settings(settings: &Settings) -> Self {
        let defaults = Self::default();
        Self {
            max_file_bytes: settings
                .get_u64("upload.max_file_bytes")
                .unwrap_or(defaults.max_file_bytes),
            max_chunk_bytes: settings
                .get_usize("upload.max_chunk_bytes")
                .unwrap_or(defaults.max_chunk_bytes),
            sniff_bytes: settings
                .get_usize("upload.sniff_bytes")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.sniff_bytes),
            max_concurrent_uploads: settings
                .get_usize("upload.max_concurrent")
                .unwrap_or(defaults.max_concurrent_uploads),
            download_chunk_bytes: settings
                .get_usize("download.chunk_bytes")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.download_chunk_bytes),
        }
    }
}

/// Paging of file listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl ListConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let defaults = Self::default();
        Self {
            default_page_size: settings
                .get_usize("list.default_page_size")
                .unwrap_or(defaults.default_page_size),
            max_page_size: settings
                .get_usize("list.max_page_size")
                .unwrap_or(defaults.max_page_size),
        }
    }

    /// Page size actually served for a requested `page_size`.
    pub fn effective_page_size(&self, page_size: i64) -> usize {
        if page_size <= 0 {
            return self.default_page_size;
        }
        usize::try_from(page_size)
            .unwrap_or(usize::MAX)
            .min(self.max_page_size)
    }
}
