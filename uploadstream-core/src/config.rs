//! # Settings
//!
//! A minimal string key/value configuration store. Keys are dotted
//! (`upload.max_concurrent`) and typed views are parsed on read, so the
//! store itself never fails.
//!
//! ```rust
//! use uploadstream_core::Settings;
//!
//! let mut settings = Settings::new();
//! settings.set("list.default_page_size", "20");
//!
//! assert_eq!(settings.get_usize("list.default_page_size"), Some(20));
//! ```
//!
//! ## Environment overrides
//! Variables that start with a prefix are lower-cased and `__` becomes `.`:
//!
//! ```bash
//! export UPLOADSTREAM__UPLOAD__MAX_CONCURRENT=25   # upload.max_concurrent
//! ```

use std::collections::HashMap;
use std::time::Duration;

/// Default environment prefix.
pub const ENV_PREFIX: &str = "UPLOADSTREAM__";

#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: HashMap<String, String>,
}

impl Settings {
    /// Create an empty settings store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Build settings from the process environment using [`ENV_PREFIX`].
    pub fn from_env() -> Self {
        let mut settings = Self::new();
        settings.load_env(ENV_PREFIX);
        settings
    }

    /// Merge prefixed process environment variables into this store.
    pub fn load_env(&mut self, prefix: &str) {
        self.load_vars(prefix, std::env::vars());
    }

    /// Merge prefixed variables from any iterator (tests feed this directly).
    pub fn load_vars<I>(&mut self, prefix: &str, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                self.set(normalized, value);
            }
        }
    }

    /// Set a key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Builder-style [`Settings::set`].
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.trim().parse::<usize>().ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.trim().parse::<u32>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.trim().parse::<bool>().ok())
    }

    pub fn get_duration_millis(&self, key: &str) -> Option<Duration> {
        self.get_u64(key).map(Duration::from_millis)
    }

    pub fn get_duration_secs(&self, key: &str) -> Option<Duration> {
        self.get_u64(key).map(Duration::from_secs)
    }

    /// Comma separated list; blank entries are skipped.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_are_normalized() {
        let mut settings = Settings::new();
        settings.load_vars(
            ENV_PREFIX,
            vec![
                ("UPLOADSTREAM__UPLOAD__MAX_CONCURRENT".to_string(), "25".to_string()),
                ("UPLOADSTREAM__WORKER__POLL_INTERVAL_MS".to_string(), "500".to_string()),
                ("PATH".to_string(), "/usr/bin".to_string()),
            ],
        );

        assert_eq!(settings.get_usize("upload.max_concurrent"), Some(25));
        assert_eq!(
            settings.get_duration_millis("worker.poll_interval_ms"),
            Some(Duration::from_millis(500))
        );
        assert!(!settings.has("path"));
    }

    #[test]
    fn typed_getters_ignore_garbage() {
        let settings = Settings::new()
            .with("http.port", "not-a-port")
            .with("worker.enabled", "false");

        assert_eq!(settings.get_u64("http.port"), None);
        assert_eq!(settings.get_bool("worker.enabled"), Some(false));
    }

    #[test]
    fn lists_skip_blank_entries() {
        let settings = Settings::new().with("auth.api_keys", "alpha, beta,,  ");
        assert_eq!(settings.get_list("auth.api_keys"), vec!["alpha", "beta"]);
        assert!(settings.get_list("missing").is_empty());
    }
}
