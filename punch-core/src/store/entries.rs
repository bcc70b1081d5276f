use chrono::{DateTime, TimeDelta, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use super::headers::{find_header, header_row_id, resolve};
use super::rows::{format_data, format_timestamp, EntryRow, ENTRY_COLUMNS};
use super::StoreError;
use crate::ids::{IdGenerator, RecordId};
use crate::models::{Entry, Header};

/// A running entry together with the header it is clocked against.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningEntry {
    pub entry: Entry,
    pub header: Header,
}

/// Time clocked against one header over a period.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderTotal {
    pub header: Header,
    pub duration: TimeDelta,
    pub entries: usize,
}

pub struct EntryRepository {
    pool: SqlitePool,
}

impl EntryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Closes whatever is running at `at` and starts a new entry on the header
    /// matching `query`.
    pub async fn check_in(
        &self,
        ids: &dyn IdGenerator,
        query: &str,
        at: DateTime<Utc>,
    ) -> Result<RunningEntry, StoreError> {
        let mut tx = self.pool.begin().await?;

        let header = resolve(&mut tx, query).await?;
        let header_id = header_row_id(&mut tx, &header.uuid)
            .await?
            .ok_or_else(|| StoreError::HeaderNotFound(query.to_string()))?;

        let closed = close_running(&mut tx, at).await?;

        let entry = Entry::start(ids.next_id(), header.uuid.clone(), at);
        upsert_entry(&mut tx, header_id, &entry).await?;
        tx.commit().await?;

        tracing::debug!(
            uuid = %entry.uuid,
            header = %header.uuid,
            closed = closed.len(),
            "checked in"
        );

        Ok(RunningEntry { entry, header })
    }

    /// Closes every running entry at `at` and returns them.
    pub async fn check_out(&self, at: DateTime<Utc>) -> Result<Vec<Entry>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let closed = close_running(&mut tx, at).await?;
        if closed.is_empty() {
            return Err(StoreError::NothingRunning);
        }
        tx.commit().await?;

        Ok(closed)
    }

    /// Moves the most recently started running entry to the header matching
    /// `query`.
    pub async fn switch(&self, query: &str) -> Result<RunningEntry, StoreError> {
        let mut tx = self.pool.begin().await?;

        let header = resolve(&mut tx, query).await?;
        let header_id = header_row_id(&mut tx, &header.uuid)
            .await?
            .ok_or_else(|| StoreError::HeaderNotFound(query.to_string()))?;

        let sql = format!(
            "SELECT {} FROM entries e JOIN headers h ON h.header_id = e.header_id \
             WHERE e.end_time IS NULL ORDER BY e.start_time DESC, e.entry_id DESC LIMIT 1",
            ENTRY_COLUMNS
        );
        let row: Option<EntryRow> = sqlx::query_as(&sql).fetch_optional(&mut *tx).await?;
        let mut entry = row.ok_or(StoreError::NothingRunning)?.into_entry()?;

        sqlx::query("UPDATE entries SET header_id = ?, revision = NULL WHERE entry_uuid = ?")
            .bind(header_id)
            .bind(entry.uuid.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        entry.header_uuid = header.uuid.clone();
        entry.revision = Default::default();
        Ok(RunningEntry { entry, header })
    }

    /// Running entries, oldest first.
    pub async fn running(&self) -> Result<Vec<RunningEntry>, StoreError> {
        let mut conn = self.pool.acquire().await?;

        let mut result = Vec::new();
        for entry in running_entries(&mut conn).await? {
            let header = find_header(&mut conn, &entry.header_uuid)
                .await?
                .ok_or_else(|| StoreError::HeaderNotFound(entry.header_uuid.to_string()))?;
            result.push(RunningEntry { entry, header });
        }
        Ok(result)
    }

    pub async fn get(&self, uuid: &RecordId) -> Result<Option<Entry>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(find_entry(&mut conn, uuid).await?)
    }

    /// Clocked time per active header for entries started in `[from, to)`,
    /// longest first.
    ///
    /// Pending and committed entries count alike; a running entry counts up
    /// to `now`. `filter` keeps headers whose title contains it, ignoring
    /// ASCII case.
    pub async fn totals(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        filter: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<HeaderTotal>, StoreError> {
        let mut conn = self.pool.acquire().await?;

        let sql = format!(
            "SELECT {} FROM entries e JOIN headers h ON h.header_id = e.header_id \
             WHERE h.active = 1 AND e.start_time >= ? AND e.start_time < ? \
             AND instr(lower(h.header), lower(?)) > 0 \
             ORDER BY e.start_time, e.entry_id",
            ENTRY_COLUMNS
        );
        let rows: Vec<EntryRow> = sqlx::query_as(&sql)
            .bind(format_timestamp(&from))
            .bind(format_timestamp(&to))
            .bind(filter.unwrap_or_default())
            .fetch_all(&mut *conn)
            .await?;

        let mut totals: Vec<HeaderTotal> = Vec::new();
        for row in rows {
            let entry = row.into_entry()?;
            let duration = entry.duration(now).max(TimeDelta::zero());

            match totals.iter_mut().find(|t| t.header.uuid == entry.header_uuid) {
                Some(total) => {
                    total.duration = total.duration + duration;
                    total.entries += 1;
                }
                None => {
                    let header = find_header(&mut conn, &entry.header_uuid)
                        .await?
                        .ok_or_else(|| StoreError::HeaderNotFound(entry.header_uuid.to_string()))?;
                    totals.push(HeaderTotal {
                        header,
                        duration,
                        entries: 1,
                    });
                }
            }
        }

        totals.sort_by(|a, b| {
            b.duration
                .cmp(&a.duration)
                .then_with(|| a.header.title.cmp(&b.header.title))
        });
        Ok(totals)
    }
}

async fn running_entries(conn: &mut SqliteConnection) -> Result<Vec<Entry>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM entries e JOIN headers h ON h.header_id = e.header_id \
         WHERE e.end_time IS NULL ORDER BY e.start_time, e.entry_id",
        ENTRY_COLUMNS
    );
    let rows: Vec<EntryRow> = sqlx::query_as(&sql).fetch_all(&mut *conn).await?;
    rows.into_iter().map(EntryRow::into_entry).collect()
}

async fn close_running(
    conn: &mut SqliteConnection,
    at: DateTime<Utc>,
) -> Result<Vec<Entry>, StoreError> {
    let running = running_entries(conn).await?;

    if let Some(entry) = running.iter().find(|e| e.start > at) {
        return Err(StoreError::Invalid(format!(
            "entry started at {} cannot end at {}",
            entry.start.format("%Y-%m-%d %H:%M"),
            at.format("%Y-%m-%d %H:%M")
        )));
    }

    let mut closed = Vec::with_capacity(running.len());
    for entry in running {
        sqlx::query("UPDATE entries SET end_time = ?, revision = NULL WHERE entry_uuid = ?")
            .bind(format_timestamp(&at))
            .bind(entry.uuid.as_str())
            .execute(&mut *conn)
            .await?;
        closed.push(entry.closed_at(at).with_revision(Default::default()));
    }
    Ok(closed)
}

pub(crate) async fn find_entry(
    conn: &mut SqliteConnection,
    uuid: &RecordId,
) -> Result<Option<Entry>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM entries e JOIN headers h ON h.header_id = e.header_id WHERE e.entry_uuid = ?",
        ENTRY_COLUMNS
    );
    let row: Option<EntryRow> = sqlx::query_as(&sql)
        .bind(uuid.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    row.map(EntryRow::into_entry).transpose()
}

/// Inserts or overwrites an entry by uuid, keeping its local row id.
/// `header_id` is the local row id of the entry's header.
pub(crate) async fn upsert_entry(
    conn: &mut SqliteConnection,
    header_id: i64,
    entry: &Entry,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO entries (entry_uuid, revision, header_id, start_time, end_time, data)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(entry_uuid) DO UPDATE SET
            revision = excluded.revision,
            header_id = excluded.header_id,
            start_time = excluded.start_time,
            end_time = excluded.end_time,
            data = excluded.data
        "#,
    )
    .bind(entry.uuid.as_str())
    .bind(entry.revision.to_column())
    .bind(header_id)
    .bind(format_timestamp(&entry.start))
    .bind(entry.end.as_option().as_ref().map(format_timestamp))
    .bind(format_data(entry.data.as_ref()))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIds;
    use crate::models::{EntryEnd, Revision};
    use crate::store::{init_db, HeaderRepository};
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct TestContext {
        headers: HeaderRepository,
        entries: EntryRepository,
        ids: SequentialIds,
        _temp_dir: TempDir,
    }

    impl TestContext {
        async fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let pool = init_db(&temp_dir.path().join("clock.db")).await.unwrap();
            let ctx = Self {
                headers: HeaderRepository::new(pool.clone()),
                entries: EntryRepository::new(pool),
                ids: SequentialIds::new("id"),
                _temp_dir: temp_dir,
            };
            ctx.headers
                .create(&ctx.ids, "Project X", Some("px"), at(8, 0))
                .await
                .unwrap();
            ctx.headers
                .create(&ctx.ids, "Support", Some("sup"), at(8, 0))
                .await
                .unwrap();
            ctx
        }
    }

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 11, 1, hour, min, 0).unwrap()
    }

    #[tokio::test]
    async fn test_check_in_closes_previous_entry() {
        let ctx = TestContext::new().await;

        let first = ctx.entries.check_in(&ctx.ids, "@px", at(9, 0)).await.unwrap();
        assert_eq!(first.header.title, "Project X");
        assert!(first.entry.is_running());

        let second = ctx.entries.check_in(&ctx.ids, "support", at(10, 30)).await.unwrap();

        let running = ctx.entries.running().await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].entry.uuid, second.entry.uuid);
        assert_eq!(running[0].header.title, "Support");

        let closed = ctx.entries.get(&first.entry.uuid).await.unwrap().unwrap();
        assert_eq!(closed.end, EntryEnd::Closed(at(10, 30)));
        assert_eq!(closed.revision, Revision::Pending);
    }

    #[tokio::test]
    async fn test_check_out() {
        let ctx = TestContext::new().await;
        assert!(matches!(
            ctx.entries.check_out(at(9, 0)).await,
            Err(StoreError::NothingRunning)
        ));

        let started = ctx.entries.check_in(&ctx.ids, "@px", at(9, 0)).await.unwrap();
        let closed = ctx.entries.check_out(at(11, 15)).await.unwrap();

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].uuid, started.entry.uuid);
        assert_eq!(closed[0].duration(at(23, 0)), chrono::Duration::minutes(135));
        assert!(ctx.entries.running().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_check_out_before_start_is_rejected() {
        let ctx = TestContext::new().await;
        ctx.entries.check_in(&ctx.ids, "@px", at(9, 0)).await.unwrap();

        let err = ctx.entries.check_out(at(8, 30)).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert_eq!(ctx.entries.running().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_switch_moves_running_entry() {
        let ctx = TestContext::new().await;
        let started = ctx.entries.check_in(&ctx.ids, "@px", at(9, 0)).await.unwrap();

        let switched = ctx.entries.switch("@sup").await.unwrap();
        assert_eq!(switched.entry.uuid, started.entry.uuid);
        assert_eq!(switched.entry.start, at(9, 0));
        assert_eq!(switched.header.title, "Support");

        let stored = ctx.entries.get(&started.entry.uuid).await.unwrap().unwrap();
        assert_eq!(stored.header_uuid, switched.header.uuid);
    }

    #[tokio::test]
    async fn test_switch_without_running_entry() {
        let ctx = TestContext::new().await;
        assert!(matches!(
            ctx.entries.switch("@sup").await,
            Err(StoreError::NothingRunning)
        ));
    }

    #[tokio::test]
    async fn test_totals_per_header() {
        let ctx = TestContext::new().await;
        ctx.entries.check_in(&ctx.ids, "@px", at(9, 0)).await.unwrap();
        ctx.entries.check_in(&ctx.ids, "@sup", at(10, 30)).await.unwrap();
        ctx.entries.check_out(at(11, 0)).await.unwrap();
        ctx.entries.check_in(&ctx.ids, "@px", at(13, 0)).await.unwrap();

        // already synced: one inside the day, one the day before
        let px = ctx.headers.find("@px").await.unwrap();
        let sup = ctx.headers.find("@sup").await.unwrap();
        let mut conn = ctx.entries.pool.acquire().await.unwrap();
        let early = Entry::start("early".into(), px.uuid.clone(), at(7, 0))
            .closed_at(at(8, 0))
            .with_revision(Revision::Committed(3));
        let px_id = header_row_id(&mut conn, &px.uuid).await.unwrap().unwrap();
        upsert_entry(&mut conn, px_id, &early).await.unwrap();
        let yesterday = chrono::Duration::days(1);
        let before = Entry::start("before".into(), sup.uuid.clone(), at(9, 0) - yesterday)
            .closed_at(at(17, 0) - yesterday)
            .with_revision(Revision::Committed(3));
        let sup_id = header_row_id(&mut conn, &sup.uuid).await.unwrap().unwrap();
        upsert_entry(&mut conn, sup_id, &before).await.unwrap();
        drop(conn);

        let day = at(0, 0);
        let totals = ctx
            .entries
            .totals(day, day + chrono::Duration::days(1), None, at(14, 0))
            .await
            .unwrap();

        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].header.title, "Project X");
        assert_eq!(totals[0].duration, chrono::Duration::minutes(210));
        assert_eq!(totals[0].entries, 3);
        assert_eq!(totals[1].header.title, "Support");
        assert_eq!(totals[1].duration, chrono::Duration::minutes(30));
        assert_eq!(totals[1].entries, 1);

        // the range end is exclusive
        let totals = ctx
            .entries
            .totals(day, at(9, 0), None, at(14, 0))
            .await
            .unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].entries, 1);
        assert_eq!(totals[0].duration, chrono::Duration::minutes(60));
    }

    #[tokio::test]
    async fn test_totals_filter_and_inactive_headers() {
        let ctx = TestContext::new().await;
        ctx.entries.check_in(&ctx.ids, "@px", at(9, 0)).await.unwrap();
        ctx.entries.check_in(&ctx.ids, "@sup", at(10, 0)).await.unwrap();
        ctx.entries.check_out(at(11, 0)).await.unwrap();

        let (from, to, now) = (at(0, 0), at(23, 59), at(23, 59));

        let totals = ctx.entries.totals(from, to, Some("PROJ"), now).await.unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].header.title, "Project X");

        ctx.headers.deactivate("@sup").await.unwrap();
        let totals = ctx.entries.totals(from, to, None, now).await.unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].header.title, "Project X");

        let later = at(23, 59) + chrono::Duration::days(1);
        assert!(ctx.entries.totals(to, later, None, now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_check_in_unknown_header() {
        let ctx = TestContext::new().await;
        assert!(matches!(
            ctx.entries.check_in(&ctx.ids, "@nope", at(9, 0)).await,
            Err(StoreError::HeaderNotFound(_))
        ));
    }
}
