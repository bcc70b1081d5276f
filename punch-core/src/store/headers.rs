use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use super::rows::{format_data, format_timestamp, HeaderRow, HEADER_COLUMNS};
use super::StoreError;
use crate::ids::{IdGenerator, RecordId};
use crate::models::Header;

pub struct HeaderRepository {
    pool: SqlitePool,
}

impl HeaderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates a new pending header.
    pub async fn create(
        &self,
        ids: &dyn IdGenerator,
        title: &str,
        handle: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Header, StoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::Invalid("header title cannot be empty".into()));
        }
        let handle = handle.map(normalize_handle).transpose()?;

        let mut tx = self.pool.begin().await?;

        if let Some(handle) = &handle {
            ensure_handle_free(&mut tx, handle).await?;
        }

        let header = Header {
            handle,
            ..Header::new(ids.next_id(), title, now)
        };

        upsert_header(&mut tx, &header).await?;
        tx.commit().await?;

        tracing::debug!(uuid = %header.uuid, title = %header.title, "created header");

        Ok(header)
    }

    /// Lists headers by title; inactive ones only when `include_inactive`.
    pub async fn list(&self, include_inactive: bool) -> Result<Vec<Header>, StoreError> {
        let sql = format!(
            "SELECT {} FROM headers WHERE active = 1 OR ? ORDER BY header COLLATE NOCASE, header_id",
            HEADER_COLUMNS
        );
        let rows: Vec<HeaderRow> = sqlx::query_as(&sql)
            .bind(include_inactive)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(HeaderRow::into_header)
            .collect::<Result<_, _>>()?)
    }

    /// Finds an active header by `@handle` or by title substring.
    pub async fn find(&self, query: &str) -> Result<Header, StoreError> {
        let mut conn = self.pool.acquire().await?;
        resolve(&mut conn, query).await
    }

    pub async fn get(&self, uuid: &RecordId) -> Result<Option<Header>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(find_header(&mut conn, uuid).await?)
    }

    pub async fn rename(&self, query: &str, title: &str) -> Result<Header, StoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::Invalid("header title cannot be empty".into()));
        }

        let mut tx = self.pool.begin().await?;
        let mut header = resolve(&mut tx, query).await?;
        header.title = title.to_string();
        touch(&mut tx, &header).await?;
        tx.commit().await?;

        header.revision = Default::default();
        Ok(header)
    }

    /// Soft-deletes a header. Its entries stay.
    pub async fn deactivate(&self, query: &str) -> Result<Header, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut header = resolve(&mut tx, query).await?;
        header.active = false;
        touch(&mut tx, &header).await?;
        tx.commit().await?;

        header.revision = Default::default();
        Ok(header)
    }
}

/// Strips a leading `@` and checks the handle is a single word.
pub fn normalize_handle(handle: &str) -> Result<String, StoreError> {
    let handle = handle.trim();
    let handle = handle.strip_prefix('@').unwrap_or(handle);
    if handle.is_empty() || handle.chars().any(char::is_whitespace) {
        return Err(StoreError::Invalid(format!(
            "'{}' is not a valid handle",
            handle
        )));
    }
    Ok(handle.to_string())
}

async fn ensure_handle_free(conn: &mut SqliteConnection, handle: &str) -> Result<(), StoreError> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM headers WHERE handle = ? AND active = 1")
            .bind(handle)
            .fetch_one(&mut *conn)
            .await?;

    if count > 0 {
        return Err(StoreError::HandleTaken(handle.to_string()));
    }
    Ok(())
}

/// Resolves `@handle` exactly, otherwise a case-insensitive title substring
/// that must match exactly one active header.
pub(crate) async fn resolve(conn: &mut SqliteConnection, query: &str) -> Result<Header, StoreError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(StoreError::Invalid("no header given".into()));
    }

    let mut rows: Vec<HeaderRow> = match query.strip_prefix('@') {
        Some(handle) => {
            let sql = format!(
                "SELECT {} FROM headers WHERE active = 1 AND handle = ?",
                HEADER_COLUMNS
            );
            sqlx::query_as(&sql).bind(handle).fetch_all(&mut *conn).await?
        }
        None => {
            let sql = format!(
                "SELECT {} FROM headers WHERE active = 1 AND instr(lower(header), lower(?)) > 0",
                HEADER_COLUMNS
            );
            sqlx::query_as(&sql).bind(query).fetch_all(&mut *conn).await?
        }
    };

    if rows.len() > 1 {
        return Err(StoreError::AmbiguousHeader {
            query: query.to_string(),
            count: rows.len(),
        });
    }
    match rows.pop() {
        Some(row) => Ok(row.into_header()?),
        None => Err(StoreError::HeaderNotFound(query.to_string())),
    }
}

/// Writes a local edit and marks the header pending.
async fn touch(conn: &mut SqliteConnection, header: &Header) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE headers SET revision = NULL, handle = ?, header = ?, active = ?, data = ? WHERE header_uuid = ?",
    )
    .bind(&header.handle)
    .bind(&header.title)
    .bind(header.active)
    .bind(format_data(header.data.as_ref()))
    .bind(header.uuid.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn find_header(
    conn: &mut SqliteConnection,
    uuid: &RecordId,
) -> Result<Option<Header>, sqlx::Error> {
    let sql = format!("SELECT {} FROM headers WHERE header_uuid = ?", HEADER_COLUMNS);
    let row: Option<HeaderRow> = sqlx::query_as(&sql)
        .bind(uuid.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    row.map(HeaderRow::into_header).transpose()
}

pub(crate) async fn header_row_id(
    conn: &mut SqliteConnection,
    uuid: &RecordId,
) -> Result<Option<i64>, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT header_id FROM headers WHERE header_uuid = ?")
        .bind(uuid.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|(id,)| id))
}

/// Inserts or overwrites a header by uuid, keeping its local row id and
/// creation date.
pub(crate) async fn upsert_header(
    conn: &mut SqliteConnection,
    header: &Header,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO headers (header_uuid, revision, handle, header, active, creation_date, data)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(header_uuid) DO UPDATE SET
            revision = excluded.revision,
            handle = excluded.handle,
            header = excluded.header,
            active = excluded.active,
            data = excluded.data
        "#,
    )
    .bind(header.uuid.as_str())
    .bind(header.revision.to_column())
    .bind(&header.handle)
    .bind(&header.title)
    .bind(header.active)
    .bind(format_timestamp(&header.created_at))
    .bind(format_data(header.data.as_ref()))
    .execute(&mut *conn)
    .await?;
    Ok(())
}
