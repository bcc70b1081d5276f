//! Shared keys of the owners allowed to sync.
//!
//! ```yaml
//! keys:
//!   - owner: "jorg"
//!     key: "your-secret-key-here"
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
struct KeyEntry {
    owner: String,
    key: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct KeysFile {
    #[serde(default)]
    keys: Vec<KeyEntry>,
}

/// Maps owner -> key.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, String>,
}

impl ApiKeyStore {
    /// Loads keys from a YAML file. A missing or unreadable file yields an
    /// empty store, which rejects every request.
    pub fn load(path: &Path) -> Self {
        let keys = match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str::<KeysFile>(&contents) {
                Ok(file) => file.keys,
                Err(e) => {
                    tracing::warn!("Failed to parse keys file {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read keys file {}: {}", path.display(), e);
                Vec::new()
            }
        };

        let store = Self::from_entries(keys.into_iter().map(|e| (e.owner, e.key)));
        if store.is_empty() {
            tracing::warn!("No keys loaded - every sync request will be rejected");
        } else {
            tracing::info!("Loaded {} key(s)", store.keys.len());
        }
        store
    }

    pub fn from_entries<I, O, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (O, K)>,
        O: Into<String>,
        K: Into<String>,
    {
        Self {
            keys: entries
                .into_iter()
                .map(|(owner, key)| (owner.into(), key.into()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// True if `key` is the key registered for `owner`.
    pub fn authorize(&self, owner: &str, key: &str) -> bool {
        self.keys
            .get(owner)
            .is_some_and(|expected| !expected.is_empty() && expected == key)
    }
}
