//! Wire types for the `T.Sync` call.
//!
//! The sync endpoint speaks JSON-RPC 1.0 over HTTP POST: the request carries
//! the method name, a single-element `params` array and an id; the response
//! carries either `result` or `error`. Field names match the records the
//! server already stores, so a header's title travels as `header` and its
//! creation time as `creation_date`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::error::SyncError;
use crate::ids::RecordId;
use crate::models::{Entry, EntryEnd, Header, Revision};

/// Method name of the sync call.
pub const SYNC_METHOD: &str = "T.Sync";

/// Id used for every sync request. One call is made per exchange, so the id
/// only has to match between request and response; keeping it fixed makes a
/// retried round byte-for-byte identical.
pub const REQUEST_ID: u64 = 1;

/// A header as sent over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderRecord {
    pub uuid: RecordId,
    #[serde(default)]
    pub revision: i64,
    pub header: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub handle: Option<String>,
    pub active: bool,
    pub creation_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl HeaderRecord {
    /// Local header carrying the given revision.
    pub fn into_header(self, revision: Revision) -> Header {
        Header {
            uuid: self.uuid,
            revision,
            handle: self.handle,
            title: self.header,
            active: self.active,
            created_at: self.creation_date,
            data: self.data,
        }
    }
}

impl From<&Header> for HeaderRecord {
    fn from(h: &Header) -> Self {
        Self {
            uuid: h.uuid.clone(),
            revision: h.revision.to_wire(),
            header: h.title.clone(),
            handle: h.handle.clone(),
            active: h.active,
            creation_date: h.created_at,
            data: h.data.clone(),
        }
    }
}

/// An entry as sent over the wire. A missing `end` means the clock is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub uuid: RecordId,
    #[serde(default)]
    pub revision: i64,
    pub header_uuid: RecordId,
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl EntryRecord {
    pub fn into_entry(self, revision: Revision) -> Entry {
        Entry {
            uuid: self.uuid,
            revision,
            header_uuid: self.header_uuid,
            start: self.start,
            end: EntryEnd::from_option(self.end),
            data: self.data,
        }
    }
}

impl From<&Entry> for EntryRecord {
    fn from(e: &Entry) -> Self {
        Self {
            uuid: e.uuid.clone(),
            revision: e.revision.to_wire(),
            header_uuid: e.header_uuid.clone(),
            start: e.start,
            end: e.end.as_option(),
            data: e.data.clone(),
        }
    }
}

/// Argument of `T.Sync`: the caller's ledger revision and its pending records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncArgs {
    pub owner: String,
    pub revision: i64,
    pub key: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: Vec<HeaderRecord>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub entries: Vec<EntryRecord>,
}

impl SyncArgs {
    pub fn new(
        owner: impl Into<String>,
        key: impl Into<String>,
        revision: i64,
        headers: &[Header],
        entries: &[Entry],
    ) -> Self {
        Self {
            owner: owner.into(),
            revision,
            key: key.into(),
            headers: headers.iter().map(HeaderRecord::from).collect(),
            entries: entries.iter().map(EntryRecord::from).collect(),
        }
    }

    pub fn pushes_anything(&self) -> bool {
        !self.headers.is_empty() || !self.entries.is_empty()
    }
}

/// Result of `T.Sync`: the new revision and the authoritative records that
/// changed since the caller's revision. Revision 0 means "nothing new".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReply {
    #[serde(default)]
    pub owner: String,
    pub revision: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: Vec<HeaderRecord>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub entries: Vec<EntryRecord>,
}

impl SyncReply {
    /// Reply for a round in which the server had nothing to report.
    pub fn nothing_new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            revision: 0,
            headers: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.revision == 0
    }

    /// Checks the reply against the revision the round started from.
    pub fn validate(&self, ledger_revision: i64) -> Result<(), SyncError> {
        if self.revision < 0 {
            return Err(SyncError::Protocol(format!(
                "negative revision {} in reply",
                self.revision
            )));
        }
        if self.is_noop() {
            return Ok(());
        }
        if self.revision < ledger_revision {
            return Err(SyncError::Protocol(format!(
                "server revision {} is behind local revision {}",
                self.revision, ledger_revision
            )));
        }
        if let Some(h) = self.headers.iter().find(|h| h.uuid.is_empty()) {
            return Err(SyncError::Protocol(format!(
                "header '{}' in reply has no uuid",
                h.header
            )));
        }
        for e in &self.entries {
            if e.uuid.is_empty() {
                return Err(SyncError::Protocol("entry in reply has no uuid".into()));
            }
            if e.header_uuid.is_empty() {
                return Err(SyncError::Protocol(format!(
                    "entry {} in reply has no header_uuid",
                    e.uuid
                )));
            }
        }
        Ok(())
    }
}

/// JSON-RPC request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest<P> {
    pub method: String,
    pub params: Vec<P>,
    #[serde(default)]
    pub id: Value,
}

impl<P> RpcRequest<P> {
    pub fn new(method: impl Into<String>, param: P) -> Self {
        Self {
            method: method.into(),
            params: vec![param],
            id: Value::from(REQUEST_ID),
        }
    }
}

/// JSON-RPC response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse<R> {
    #[serde(default = "none")]
    pub result: Option<R>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub id: Value,
}

fn none<R>() -> Option<R> {
    None
}

impl<R> RpcResponse<R> {
    pub fn success(id: Value, result: R) -> Self {
        Self {
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, message: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(Value::String(message.into())),
            id,
        }
    }

    /// Unwraps the envelope, turning a server-side error or a missing result
    /// into a protocol error.
    pub fn into_result(self) -> Result<R, SyncError> {
        if let Some(error) = self.error.filter(|e| !e.is_null()) {
            let message = match error {
                Value::String(s) => s,
                other => other.to_string(),
            };
            return Err(SyncError::Protocol(format!("server rejected request: {}", message)));
        }
        if self.id != Value::from(REQUEST_ID) {
            return Err(SyncError::Protocol(format!(
                "response id {} does not match request id {}",
                self.id, REQUEST_ID
            )));
        }
        self.result
            .ok_or_else(|| SyncError::Protocol("response has neither result nor error".into()))
    }
}

/// Encodes a `T.Sync` request body.
pub fn encode_sync_request(args: &SyncArgs) -> Result<Vec<u8>, SyncError> {
    serde_json::to_vec(&RpcRequest::new(SYNC_METHOD, args))
        .map_err(|e| SyncError::Protocol(format!("failed to encode request: {}", e)))
}

/// Decodes a `T.Sync` response body.
pub fn decode_sync_response(body: &[u8]) -> Result<SyncReply, SyncError> {
    let response: RpcResponse<SyncReply> = serde_json::from_slice(body)
        .map_err(|e| SyncError::Protocol(format!("failed to decode response: {}", e)))?;
    response.into_result()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}
