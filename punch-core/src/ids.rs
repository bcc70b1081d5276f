//! Record identities.
//!
//! Every header and entry carries a [`RecordId`] that is minted once on the
//! machine that created it and never changes. It is the only identity that
//! crosses the sync boundary; SQLite row ids stay local.
//!
//! Ids are 16 random bytes (a v4 UUID) encoded as unpadded base64url, the
//! format already used by existing clock databases and the sync server.

use std::sync::atomic::{AtomicU64, Ordering};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique identity of a header or entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wraps an id received from storage or the wire.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Capability for minting ids of newly created records.
///
/// Repositories take this as a parameter instead of calling a global, so
/// tests can create records with predictable ids.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> RecordId;
}

/// Random ids for production use.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&self) -> RecordId {
        RecordId(URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes()))
    }
}

/// Deterministic ids: `<prefix>1`, `<prefix>2`, ...
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> RecordId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        RecordId(format!("{}{}", self.prefix, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_ids_are_unique() {
        let ids = RandomIds;
        assert_ne!(ids.next_id(), ids.next_id());
    }

    #[test]
    fn test_random_id_format() {
        let id = RandomIds.next_id();
        // 16 bytes -> 22 base64 characters without padding
        assert_eq!(id.as_str().len(), 22);
        assert!(!id.as_str().contains('='));
        assert!(id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));

        let bytes = URL_SAFE_NO_PAD.decode(id.as_str()).unwrap();
        assert!(Uuid::from_slice(&bytes).is_ok());
    }

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIds::new("h");
        assert_eq!(ids.next_id().as_str(), "h1");
        assert_eq!(ids.next_id().as_str(), "h2");
        assert_eq!(ids.next_id().as_str(), "h3");
    }

    #[test]
    fn test_record_id_serializes_as_plain_string() {
        let id = RecordId::new("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        let parsed: RecordId = serde_json::from_str("\"xyz\"").unwrap();
        assert_eq!(parsed, RecordId::new("xyz"));
    }

    #[test]
    fn test_blank_id_is_empty() {
        assert!(RecordId::new("  ").is_empty());
        assert!(!RecordId::new("h1").is_empty());
    }
}
