use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::Revision;
use crate::ids::RecordId;

/// A trackable project or category that time is clocked against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub uuid: RecordId,
    #[serde(skip)]
    pub revision: Revision,
    pub handle: Option<String>,
    pub title: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl Header {
    /// A new, active, pending header.
    pub fn new(uuid: RecordId, title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            uuid,
            revision: Revision::Pending,
            handle: None,
            title: title.into(),
            active: true,
            created_at,
            data: None,
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    pub fn with_revision(mut self, revision: Revision) -> Self {
        self.revision = revision;
        self
    }

    /// True when every synced field matches `other`; the revision is ignored.
    pub fn same_content(&self, other: &Header) -> bool {
        self.uuid == other.uuid
            && self.handle == other.handle
            && self.title == other.title
            && self.active == other.active
            && self.created_at == other.created_at
            && self.data == other.data
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.handle {
            Some(handle) => write!(f, "{} [@{}]", self.title, handle)?,
            None => write!(f, "{}", self.title)?,
        }
        if !self.active {
            write!(f, " (inactive)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 11, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_new_header_is_pending_and_active() {
        let header = Header::new("h1".into(), "Project X", created());
        assert!(header.revision.is_pending());
        assert!(header.active);
        assert!(header.handle.is_none());
    }

    #[test]
    fn test_same_content_ignores_revision() {
        let a = Header::new("h1".into(), "Project X", created()).with_handle("px");
        let b = a.clone().with_revision(Revision::Committed(4));
        assert!(a.same_content(&b));

        let c = a.clone().with_handle("other");
        assert!(!a.same_content(&c));
    }

    #[test]
    fn test_display() {
        let mut header = Header::new("h1".into(), "Project X", created()).with_handle("px");
        assert_eq!(header.to_string(), "Project X [@px]");
        header.active = false;
        assert_eq!(header.to_string(), "Project X [@px] (inactive)");
    }
}
