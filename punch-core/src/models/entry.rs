use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::Revision;
use crate::ids::RecordId;

/// End of a clocked period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "at")]
pub enum EntryEnd {
    /// The clock is still running.
    Running,
    Closed(DateTime<Utc>),
}

impl EntryEnd {
    pub fn from_option(end: Option<DateTime<Utc>>) -> Self {
        end.map_or(EntryEnd::Running, EntryEnd::Closed)
    }

    pub fn as_option(&self) -> Option<DateTime<Utc>> {
        match self {
            EntryEnd::Running => None,
            EntryEnd::Closed(at) => Some(*at),
        }
    }
}

/// One clocked period against a header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub uuid: RecordId,
    #[serde(skip)]
    pub revision: Revision,
    pub header_uuid: RecordId,
    pub start: DateTime<Utc>,
    pub end: EntryEnd,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl Entry {
    /// A new running, pending entry.
    pub fn start(uuid: RecordId, header_uuid: RecordId, start: DateTime<Utc>) -> Self {
        Self {
            uuid,
            revision: Revision::Pending,
            header_uuid,
            start,
            end: EntryEnd::Running,
            data: None,
        }
    }

    pub fn closed_at(mut self, end: DateTime<Utc>) -> Self {
        self.end = EntryEnd::Closed(end);
        self
    }

    pub fn with_revision(mut self, revision: Revision) -> Self {
        self.revision = revision;
        self
    }

    pub fn is_running(&self) -> bool {
        self.end == EntryEnd::Running
    }

    /// Clocked time; running entries are measured up to `now`.
    pub fn duration(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.end.as_option().unwrap_or(now) - self.start
    }

    /// True when every synced field matches `other`; the revision is ignored.
    pub fn same_content(&self, other: &Entry) -> bool {
        self.uuid == other.uuid
            && self.header_uuid == other.header_uuid
            && self.start == other.start
            && self.end == other.end
            && self.data == other.data
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = self.start.format("%Y-%m-%d %H:%M");
        match self.end {
            EntryEnd::Running => write!(f, "{} --", start),
            EntryEnd::Closed(end) => write!(f, "{} -- {}", start, end.format("%Y-%m-%d %H:%M")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 11, 1, hour, min, 0).unwrap()
    }

    #[test]
    fn test_started_entry_is_running() {
        let entry = Entry::start("e1".into(), "h1".into(), at(9, 0));
        assert!(entry.is_running());
        assert!(entry.revision.is_pending());
        assert_eq!(entry.end.as_option(), None);
    }

    #[test]
    fn test_duration() {
        let entry = Entry::start("e1".into(), "h1".into(), at(9, 0)).closed_at(at(10, 30));
        assert_eq!(entry.duration(at(23, 0)), chrono::Duration::minutes(90));

        let running = Entry::start("e2".into(), "h1".into(), at(9, 0));
        assert_eq!(running.duration(at(9, 45)), chrono::Duration::minutes(45));
    }

    #[test]
    fn test_end_option_mapping() {
        assert_eq!(EntryEnd::from_option(None), EntryEnd::Running);
        assert_eq!(EntryEnd::from_option(Some(at(8, 0))), EntryEnd::Closed(at(8, 0)));
    }

    #[test]
    fn test_display() {
        let entry = Entry::start("e1".into(), "h1".into(), at(9, 0)).closed_at(at(10, 0));
        assert_eq!(entry.to_string(), "2016-11-01 09:00 -- 2016-11-01 10:00");
    }
}
