//! One sync round: push pending records, merge the server's delta.

use std::fmt;

use sqlx::SqlitePool;

use super::apply::apply_reply;
use super::client::SyncTransport;
use super::error::SyncError;
use super::protocol::SyncArgs;
use super::retry::RetryPolicy;
use crate::ids::RecordId;
use crate::store::{collect_pending, commit_pending, count_pending, Ledger, RecordCounts};

/// Summary of a successful round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Ledger revision before the round.
    pub previous_revision: i64,
    /// Ledger revision after the round.
    pub revision: i64,
    pub pushed: RecordCounts,
    pub fetched: RecordCounts,
    /// Pending records stamped with the new revision.
    pub committed: RecordCounts,
    /// Pending records whose local edits the server's copy replaced.
    pub overwritten: Vec<RecordId>,
    /// False when the server had nothing new and the database was left as is.
    pub applied: bool,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Synced revision {}, pushed {}/{}, fetched {}/{}",
            self.revision,
            self.pushed.headers,
            self.pushed.entries,
            self.fetched.headers,
            self.fetched.entries
        )
    }
}

/// Local sync state, read without taking the write lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStatus {
    pub revision: i64,
    pub pending: RecordCounts,
}

/// Runs sync rounds for one database against one server.
pub struct SyncEngine<T> {
    pool: SqlitePool,
    transport: T,
    owner: String,
    key: String,
    retry: RetryPolicy,
}

impl<T: SyncTransport> SyncEngine<T> {
    pub fn new(
        pool: SqlitePool,
        transport: T,
        owner: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            transport,
            owner: owner.into(),
            key: key.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs one round.
    ///
    /// The whole round is a single transaction that holds the database write
    /// lock from the ledger read until commit, so the records stamped with the
    /// new revision are exactly the ones that were sent. On any error, or if
    /// the future is dropped, the transaction rolls back and the database is
    /// unchanged.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        let mut tx = self.pool.begin().await?;

        let mut ledger = Ledger::load(&mut tx).await?;
        let pending = collect_pending(&mut tx).await?;

        let args = SyncArgs::new(
            &self.owner,
            &self.key,
            ledger.revision(),
            &pending.headers,
            &pending.entries,
        );

        tracing::debug!(
            revision = ledger.revision(),
            headers = args.headers.len(),
            entries = args.entries.len(),
            "starting sync round"
        );

        let reply = self.retry.run(|_| self.transport.sync(&args)).await?;
        reply.validate(ledger.revision())?;

        let mut report = SyncReport {
            previous_revision: ledger.revision(),
            revision: ledger.revision(),
            pushed: RecordCounts {
                headers: args.headers.len() as u64,
                entries: args.entries.len() as u64,
            },
            ..Default::default()
        };

        if reply.is_noop() {
            if !reply.headers.is_empty() || !reply.entries.is_empty() {
                tracing::warn!("ignoring records in a reply without a revision");
            }
            tx.rollback().await?;
            tracing::info!(revision = report.revision, "nothing new from server");
            return Ok(report);
        }

        let outcome = apply_reply(&mut tx, &reply).await?;
        let committed = commit_pending(&mut tx, reply.revision).await?;
        ledger.advance(&mut tx, reply.revision).await?;
        tx.commit().await?;

        report.revision = ledger.revision();
        report.fetched = RecordCounts {
            headers: outcome.headers as u64,
            entries: outcome.entries as u64,
        };
        report.committed = committed;
        report.overwritten = outcome.overwritten;
        report.applied = true;

        tracing::info!(
            from = report.previous_revision,
            to = report.revision,
            pushed_headers = report.pushed.headers,
            pushed_entries = report.pushed.entries,
            fetched_headers = report.fetched.headers,
            fetched_entries = report.fetched.entries,
            overwritten = report.overwritten.len(),
            "sync round complete"
        );

        Ok(report)
    }
}

/// Ledger revision and pending counts of the database behind `pool`.
pub async fn sync_status(pool: &SqlitePool) -> Result<SyncStatus, SyncError> {
    let mut conn = pool.acquire().await?;
    let revision = Ledger::read(&mut *conn).await?.revision();
    let pending = count_pending(&mut conn).await?;
    Ok(SyncStatus { revision, pending })
}
