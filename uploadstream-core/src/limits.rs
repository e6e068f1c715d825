//! Default transfer limits.
//!
//! These are the defaults for the typed configuration structs; every one of
//! them can be overridden through [`crate::Settings`].

/// Largest file accepted by an upload (512 MiB).
pub const MAX_FILE_BYTES: u64 = 512 * 1024 * 1024;

/// Largest single chunk accepted by an upload (4 MiB). Kept under common
/// transport message-size ceilings.
pub const MAX_CHUNK_BYTES: usize = 4 * 1024 * 1024;

/// Number of leading bytes inspected by the content sniffer.
pub const SNIFF_BYTES: usize = 512;

/// Size of each chunk sent back by a download (64 KiB).
pub const DOWNLOAD_CHUNK_BYTES: usize = 64 * 1024;

/// Default capacity of the upload admission gate.
pub const MAX_CONCURRENT_UPLOADS: usize = 100;

/// Longest display name accepted for an upload.
pub const MAX_DISPLAY_NAME_BYTES: usize = 255;
