use std::collections::HashSet;

use parking_lot::RwLock;
use uploadstream_core::{FileError, FileResult, Settings};

/// Decides whether an API key may call the service.
pub trait CredentialProvider: Send + Sync {
    fn verify(&self, api_key: &str) -> bool;
}

/// A fixed set of accepted keys that can be swapped at runtime.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    keys: RwLock<HashSet<String>>,
}

impl StaticCredentials {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            keys: RwLock::new(keys.into_iter().map(Into::into).collect()),
        }
    }

    /// Keys from the comma separated `auth.api_keys` setting.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.get_list("auth.api_keys"))
    }

    /// Replace every accepted key at once.
    pub fn replace<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        *self.keys.write() = keys.into_iter().map(Into::into).collect();
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

impl CredentialProvider for StaticCredentials {
    fn verify(&self, api_key: &str) -> bool {
        !api_key.is_empty() && self.keys.read().contains(api_key)
    }
}

/// Caller identity handed to the core once its key has been verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub owner_id: String,
}

/// Check `api_key` and resolve the caller. Both values come from the
/// transport's request metadata.
pub fn authenticate(
    provider: &dyn CredentialProvider,
    api_key: Option<&str>,
    owner_id: Option<&str>,
) -> FileResult<Principal> {
    let api_key = api_key
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| FileError::unauthenticated("missing API key"))?;

    if !provider.verify(api_key) {
        return Err(FileError::unauthenticated("invalid API key"));
    }

    let owner_id = owner_id
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .ok_or_else(|| FileError::unauthenticated("missing user id"))?;

    Ok(Principal {
        owner_id: owner_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uploadstream_core::ErrorKind;

    #[test]
    fn keys_can_be_rotated() {
        let credentials = StaticCredentials::new(["old-key"]);
        assert!(credentials.verify("old-key"));

        credentials.replace(["new-key"]);
        assert!(!credentials.verify("old-key"));
        assert!(credentials.verify("new-key"));
        assert!(!credentials.verify(""));
    }

    #[test]
    fn authenticate_requires_key_and_user() {
        let credentials = StaticCredentials::new(["k1"]);

        let principal = authenticate(&credentials, Some("k1"), Some("user-1")).unwrap();
        assert_eq!(principal.owner_id, "user-1");

        let err = authenticate(&credentials, None, Some("user-1")).unwrap_err();
        assert!(err.is(ErrorKind::Unauthenticated));
        assert!(authenticate(&credentials, Some("nope"), Some("user-1")).is_err());
        assert!(authenticate(&credentials, Some("k1"), Some("  ")).is_err());
    }

    #[test]
    fn settings_list_feeds_keys() {
        let settings = Settings::new().with("auth.api_keys", "a, b");
        let credentials = StaticCredentials::from_settings(&settings);
        assert_eq!(credentials.len(), 2);
        assert!(credentials.verify("b"));
    }
}
