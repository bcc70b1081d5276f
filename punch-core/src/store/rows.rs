//! Row types shared by the repositories and the sync rounds.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::ids::RecordId;
use crate::models::{Entry, EntryEnd, Header, Revision};

pub(crate) const HEADER_COLUMNS: &str =
    "header_uuid, revision, handle, header, active, creation_date, data";

pub(crate) const ENTRY_COLUMNS: &str =
    "e.entry_uuid, e.revision, h.header_uuid, e.start_time, e.end_time, e.data";

#[derive(sqlx::FromRow)]
pub(crate) struct HeaderRow {
    header_uuid: String,
    revision: Option<i64>,
    handle: Option<String>,
    header: String,
    active: bool,
    creation_date: String,
    data: Option<String>,
}

impl HeaderRow {
    pub(crate) fn into_header(self) -> Result<Header, sqlx::Error> {
        Ok(Header {
            uuid: RecordId::new(self.header_uuid),
            revision: Revision::from_column(self.revision),
            handle: self.handle.filter(|h| !h.is_empty()),
            title: self.header,
            active: self.active,
            created_at: parse_timestamp(&self.creation_date)?,
            data: parse_data(self.data.as_deref())?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct EntryRow {
    entry_uuid: String,
    revision: Option<i64>,
    header_uuid: String,
    start_time: String,
    end_time: Option<String>,
    data: Option<String>,
}

impl EntryRow {
    pub(crate) fn into_entry(self) -> Result<Entry, sqlx::Error> {
        let end = match self.end_time.as_deref() {
            Some(end) => EntryEnd::Closed(parse_timestamp(end)?),
            None => EntryEnd::Running,
        };
        Ok(Entry {
            uuid: RecordId::new(self.entry_uuid),
            revision: Revision::from_column(self.revision),
            header_uuid: RecordId::new(self.header_uuid),
            start: parse_timestamp(&self.start_time)?,
            end,
            data: parse_data(self.data.as_deref())?,
        })
    }
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn format_data(data: Option<&Map<String, Value>>) -> Option<String> {
    data.map(|d| Value::Object(d.clone()).to_string())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(format!("invalid timestamp '{}': {}", s, e).into()))
}

fn parse_data(s: Option<&str>) -> Result<Option<Map<String, Value>>, sqlx::Error> {
    match s {
        None | Some("") => Ok(None),
        Some(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(Value::Null) => Ok(None),
            Ok(other) => Err(sqlx::Error::Decode(
                format!("data column is not a JSON object: {}", other).into(),
            )),
            Err(e) => Err(sqlx::Error::Decode(
                format!("invalid data column: {}", e).into(),
            )),
        },
    }
}
