//! Merge of a sync reply into the local database.

use sqlx::SqliteConnection;

use super::error::SyncError;
use super::protocol::SyncReply;
use crate::ids::RecordId;
use crate::models::Revision;
use crate::store::{find_entry, find_header, header_row_id, upsert_entry, upsert_header};

/// What [`apply_reply`] wrote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOutcome {
    pub headers: usize,
    pub entries: usize,
    /// Pending local records whose unsent edits were replaced by the server's copy.
    pub overwritten: Vec<RecordId>,
}

/// Writes every record of `reply` over the local copy, headers first, and
/// stamps it with the reply's revision.
///
/// The server's copy always wins. Applying the same reply twice leaves the
/// database as applying it once.
pub async fn apply_reply(
    conn: &mut SqliteConnection,
    reply: &SyncReply,
) -> Result<ApplyOutcome, SyncError> {
    let revision = Revision::Committed(reply.revision);
    let mut outcome = ApplyOutcome::default();

    for record in &reply.headers {
        let mut incoming = record.clone().into_header(revision);

        if let Some(local) = find_header(conn, &incoming.uuid).await? {
            // creation date stays local
            incoming.created_at = local.created_at;
            if local.revision.is_pending() && !local.same_content(&incoming) {
                tracing::warn!(
                    uuid = %incoming.uuid,
                    local = %local,
                    server = %incoming,
                    "unsent header edit replaced by server copy"
                );
                outcome.overwritten.push(incoming.uuid.clone());
            }
        }

        upsert_header(conn, &incoming).await?;
        tracing::debug!(uuid = %incoming.uuid, revision = reply.revision, "applied header");
        outcome.headers += 1;
    }

    for record in &reply.entries {
        let incoming = record.clone().into_entry(revision);

        let header_id = header_row_id(conn, &incoming.header_uuid)
            .await?
            .ok_or_else(|| {
                SyncError::Protocol(format!(
                    "entry {} refers to unknown header {}",
                    incoming.uuid, incoming.header_uuid
                ))
            })?;

        if let Some(local) = find_entry(conn, &incoming.uuid).await? {
            if local.revision.is_pending() && !local.same_content(&incoming) {
                tracing::warn!(
                    uuid = %incoming.uuid,
                    local = %local,
                    server = %incoming,
                    "unsent entry edit replaced by server copy"
                );
                outcome.overwritten.push(incoming.uuid.clone());
            }
        }

        upsert_entry(conn, header_id, &incoming).await?;
        tracing::debug!(uuid = %incoming.uuid, revision = reply.revision, "applied entry");
        outcome.entries += 1;
    }

    Ok(outcome)
}
