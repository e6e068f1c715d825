use std::collections::HashMap;

use serde_json::json;
use uploadstream_core::limits::MAX_DISPLAY_NAME_BYTES;
use uploadstream_core::{FileError, FileResult};

use crate::sniff::{detect_content_type, TEXT_UTF8};
use crate::UploadMetadata;

/// Checks that uploaded bytes look like what the client said they are.
///
/// A declared type is accepted when it equals the detected one, shares its
/// top-level type (`image/png` declared, `image/gif` detected), or is listed
/// in the alias table for a known false sniff (JSON detected as plain text).
#[derive(Debug, Clone)]
pub struct ContentValidator {
    aliases: HashMap<String, Vec<String>>,
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self::empty()
            .with_alias("text/plain", TEXT_UTF8)
            .with_alias("application/json", "text/plain")
            .with_alias("application/json", TEXT_UTF8)
            .with_alias("application/xml", "text/xml")
            .with_alias("application/xml", "text/xml; charset=utf-8")
            .with_alias("application/xml", TEXT_UTF8)
            .with_alias("application/javascript", TEXT_UTF8)
            .with_alias("image/svg+xml", "text/xml; charset=utf-8")
            .with_alias("image/svg+xml", TEXT_UTF8)
    }
}

impl ContentValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validator with no aliases at all.
    pub fn empty() -> Self {
        Self {
            aliases: HashMap::new(),
        }
    }

    /// Accept `detected` for uploads declared as `declared`.
    pub fn with_alias(mut self, declared: impl Into<String>, detected: impl Into<String>) -> Self {
        self.aliases
            .entry(normalize(&declared.into()))
            .or_default()
            .push(normalize(&detected.into()));
        self
    }

    /// Whether a payload detected as `detected` may be stored as `declared`.
    pub fn is_match(&self, detected: &str, declared: &str) -> bool {
        let detected = normalize(detected);
        let declared = normalize(declared);

        if detected == declared {
            return true;
        }
        if top_level(&detected) == top_level(&declared) {
            return true;
        }
        self.aliases
            .get(&declared)
            .is_some_and(|compatible| compatible.iter().any(|alias| *alias == detected))
    }

    /// Sniff `prefix` and compare it with `declared`.
    pub fn validate(&self, prefix: &[u8], declared: &str) -> FileResult<()> {
        let detected = detect_content_type(prefix);
        if self.is_match(detected, declared) {
            return Ok(());
        }
        Err(FileError::invalid_argument(format!(
            "content type mismatch: declared={declared}, detected={detected}"
        ))
        .with_data(json!({ "declared": declared, "detected": detected })))
    }
}

/// Structural checks on the first message of an upload.
pub fn validate_metadata(metadata: &UploadMetadata, max_file_bytes: u64) -> FileResult<()> {
    let name = metadata.display_name.trim();
    if name.is_empty() {
        return Err(FileError::invalid_argument("display name is required"));
    }
    if metadata.display_name.len() > MAX_DISPLAY_NAME_BYTES {
        return Err(FileError::invalid_argument(format!(
            "display name too long: {} bytes (max {})",
            metadata.display_name.len(),
            MAX_DISPLAY_NAME_BYTES
        )));
    }
    if metadata.content_type.trim().is_empty() {
        return Err(FileError::invalid_argument("content type is required"));
    }
    if metadata.owner_id.trim().is_empty() {
        return Err(FileError::invalid_argument("owner id is required"));
    }
    if metadata.size == 0 {
        return Err(FileError::invalid_argument("file size must be positive"));
    }
    if metadata.size > max_file_bytes {
        return Err(FileError::invalid_argument(format!(
            "file too large: {} bytes (max {})",
            metadata.size, max_file_bytes
        )));
    }
    Ok(())
}

fn normalize(content_type: &str) -> String {
    content_type.trim().to_ascii_lowercase()
}

fn top_level(content_type: &str) -> &str {
    content_type.split('/').next().unwrap_or_default().trim()
}
