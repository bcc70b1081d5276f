use sqlx::SqliteConnection;

use super::rows::{EntryRow, HeaderRow, ENTRY_COLUMNS, HEADER_COLUMNS};
use crate::models::{Entry, Header};

/// Records not yet confirmed by the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingSet {
    pub headers: Vec<Header>,
    pub entries: Vec<Entry>,
}

impl PendingSet {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.entries.is_empty()
    }
}

/// Header and entry counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub headers: u64,
    pub entries: u64,
}

/// Reads every pending header and entry. Entries carry their header's uuid.
pub async fn collect_pending(conn: &mut SqliteConnection) -> Result<PendingSet, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM headers WHERE revision IS NULL ORDER BY header_id",
        HEADER_COLUMNS
    );
    let headers: Vec<HeaderRow> = sqlx::query_as(&sql).fetch_all(&mut *conn).await?;

    let sql = format!(
        "SELECT {} FROM entries e JOIN headers h ON h.header_id = e.header_id \
         WHERE e.revision IS NULL ORDER BY e.entry_id",
        ENTRY_COLUMNS
    );
    let entries: Vec<EntryRow> = sqlx::query_as(&sql).fetch_all(&mut *conn).await?;

    Ok(PendingSet {
        headers: headers
            .into_iter()
            .map(HeaderRow::into_header)
            .collect::<Result<_, _>>()?,
        entries: entries
            .into_iter()
            .map(EntryRow::into_entry)
            .collect::<Result<_, _>>()?,
    })
}

pub async fn count_pending(conn: &mut SqliteConnection) -> Result<RecordCounts, sqlx::Error> {
    let (headers,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM headers WHERE revision IS NULL")
        .fetch_one(&mut *conn)
        .await?;
    let (entries,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entries WHERE revision IS NULL")
        .fetch_one(&mut *conn)
        .await?;

    Ok(RecordCounts {
        headers: headers.try_into().unwrap_or_default(),
        entries: entries.try_into().unwrap_or_default(),
    })
}

/// Stamps every still-pending header and entry with `revision`.
pub async fn commit_pending(
    conn: &mut SqliteConnection,
    revision: i64,
) -> Result<RecordCounts, sqlx::Error> {
    let headers = sqlx::query("UPDATE headers SET revision = ? WHERE revision IS NULL")
        .bind(revision)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    let entries = sqlx::query("UPDATE entries SET revision = ? WHERE revision IS NULL")
        .bind(revision)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    Ok(RecordCounts { headers, entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIds;
    use crate::models::Revision;
    use crate::store::{init_db, upsert_header, EntryRepository, HeaderRepository};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_collect_and_commit_pending() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("clock.db")).await.unwrap();
        let ids = SequentialIds::new("r");
        let now = Utc.with_ymd_and_hms(2016, 11, 1, 9, 0, 0).unwrap();

        let headers = HeaderRepository::new(pool.clone());
        let entries = EntryRepository::new(pool.clone());
        let px = headers.create(&ids, "Project X", Some("px"), now).await.unwrap();
        let old = headers.create(&ids, "Old", None, now).await.unwrap();
        let running = entries.check_in(&ids, "@px", now).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        upsert_header(&mut conn, &old.with_revision(Revision::Committed(3)))
            .await
            .unwrap();

        let pending = collect_pending(&mut conn).await.unwrap();
        assert_eq!(
            count_pending(&mut conn).await.unwrap(),
            RecordCounts { headers: 1, entries: 1 }
        );
        assert_eq!(pending.headers, vec![px]);
        assert_eq!(pending.entries, vec![running.entry]);

        let counts = commit_pending(&mut conn, 4).await.unwrap();
        assert_eq!(counts, RecordCounts { headers: 1, entries: 1 });
        assert!(collect_pending(&mut conn).await.unwrap().is_empty());

        let counts = commit_pending(&mut conn, 5).await.unwrap();
        assert_eq!(counts, RecordCounts::default());
    }
}
