//! Authoritative record store behind the `T.Sync` endpoint.
//!
//! Every owner has a revision counter. A request that pushes records takes
//! the next revision and stores each pushed record at it; the reply carries
//! every record newer than the caller's revision that the caller did not
//! just send.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use punch_core::sync::{EntryRecord, HeaderRecord, SyncArgs, SyncReply};
use punch_core::RecordId;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::SqliteConnection;

/// Errors that can occur while serving a sync request.
#[derive(Debug)]
pub enum ServerError {
    /// The caller claims a revision this server never handed out.
    AheadOfServer { client: i64, server: i64 },
    /// The request itself is malformed.
    InvalidRequest(String),
    /// Database failure.
    Database(sqlx::Error),
    /// Failed to create the database directory.
    Io(std::io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::AheadOfServer { client, server } => write!(
                f,
                "client revision {} is ahead of server revision {}",
                client, server
            ),
            ServerError::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            ServerError::Database(e) => write!(f, "database error: {}", e),
            ServerError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Database(e) => Some(e),
            ServerError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for ServerError {
    fn from(e: sqlx::Error) -> Self {
        ServerError::Database(e)
    }
}

impl From<sqlx::migrate::MigrateError> for ServerError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        ServerError::Database(e.into())
    }
}

#[derive(sqlx::FromRow)]
struct HeaderRow {
    header_uuid: String,
    revision: i64,
    handle: Option<String>,
    header: String,
    active: bool,
    creation_date: String,
    data: Option<String>,
}

impl HeaderRow {
    fn into_record(self) -> Result<HeaderRecord, ServerError> {
        Ok(HeaderRecord {
            uuid: RecordId::new(self.header_uuid),
            revision: self.revision,
            header: self.header,
            handle: self.handle.filter(|h| !h.is_empty()),
            active: self.active,
            creation_date: parse_timestamp(&self.creation_date)?,
            data: parse_data(self.data.as_deref())?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    entry_uuid: String,
    revision: i64,
    header_uuid: String,
    start_time: String,
    end_time: Option<String>,
    data: Option<String>,
}

impl EntryRow {
    fn into_record(self) -> Result<EntryRecord, ServerError> {
        Ok(EntryRecord {
            uuid: RecordId::new(self.entry_uuid),
            revision: self.revision,
            header_uuid: RecordId::new(self.header_uuid),
            start: parse_timestamp(&self.start_time)?,
            end: self.end_time.as_deref().map(parse_timestamp).transpose()?,
            data: parse_data(self.data.as_deref())?,
        })
    }
}

/// SQLite-backed store for all owners.
#[derive(Debug, Clone)]
pub struct ServerStore {
    pool: SqlitePool,
}

impl ServerStore {
    /// Opens (creating if needed) the server database and applies migrations.
    pub async fn open(path: &Path) -> Result<Self, ServerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(ServerError::Io)?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Current revision of `owner`; 0 for an owner that never synced.
    pub async fn revision(&self, owner: &str) -> Result<i64, ServerError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT revision FROM owners WHERE owner = ?")
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(r,)| r).unwrap_or(0))
    }

    /// Serves one `T.Sync` request for an already authorized owner.
    pub async fn sync(&self, args: &SyncArgs) -> Result<SyncReply, ServerError> {
        validate(args)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO owners (owner, revision) VALUES (?, 0)")
            .bind(&args.owner)
            .execute(&mut *tx)
            .await?;
        let (current,): (i64,) = sqlx::query_as("SELECT revision FROM owners WHERE owner = ?")
            .bind(&args.owner)
            .fetch_one(&mut *tx)
            .await?;

        if args.revision > current {
            return Err(ServerError::AheadOfServer {
                client: args.revision,
                server: current,
            });
        }

        let mut pushed_headers = HashSet::new();
        let mut pushed_entries = HashSet::new();
        let mut revision = current;

        if args.pushes_anything() {
            revision = current + 1;
            sqlx::query("UPDATE owners SET revision = ? WHERE owner = ?")
                .bind(revision)
                .bind(&args.owner)
                .execute(&mut *tx)
                .await?;

            for header in &args.headers {
                store_header(&mut tx, &args.owner, revision, header).await?;
                pushed_headers.insert(header.uuid.as_str());
            }
            for entry in &args.entries {
                store_entry(&mut tx, &args.owner, revision, entry).await?;
                pushed_entries.insert(entry.uuid.as_str());
            }
        }

        let headers: Vec<HeaderRow> = sqlx::query_as(
            "SELECT header_uuid, revision, handle, header, active, creation_date, data \
             FROM headers WHERE owner = ? AND revision > ? ORDER BY revision, header_uuid",
        )
        .bind(&args.owner)
        .bind(args.revision)
        .fetch_all(&mut *tx)
        .await?;

        let entries: Vec<EntryRow> = sqlx::query_as(
            "SELECT entry_uuid, revision, header_uuid, start_time, end_time, data \
             FROM entries WHERE owner = ? AND revision > ? ORDER BY revision, entry_uuid",
        )
        .bind(&args.owner)
        .bind(args.revision)
        .fetch_all(&mut *tx)
        .await?;

        let headers = headers
            .into_iter()
            .filter(|h| !pushed_headers.contains(h.header_uuid.as_str()))
            .map(HeaderRow::into_record)
            .collect::<Result<Vec<_>, _>>()?;
        let entries = entries
            .into_iter()
            .filter(|e| !pushed_entries.contains(e.entry_uuid.as_str()))
            .map(EntryRow::into_record)
            .collect::<Result<Vec<_>, _>>()?;

        tx.commit().await?;

        if !args.pushes_anything() && headers.is_empty() && entries.is_empty() {
            return Ok(SyncReply::nothing_new(&args.owner));
        }

        tracing::info!(
            owner = %args.owner,
            revision,
            pushed = pushed_headers.len() + pushed_entries.len(),
            headers = headers.len(),
            entries = entries.len(),
            "served sync"
        );

        Ok(SyncReply {
            owner: args.owner.clone(),
            revision,
            headers,
            entries,
        })
    }
}

fn validate(args: &SyncArgs) -> Result<(), ServerError> {
    if args.owner.trim().is_empty() {
        return Err(ServerError::InvalidRequest("owner is empty".into()));
    }
    if args.revision < 0 {
        return Err(ServerError::InvalidRequest(format!(
            "negative revision {}",
            args.revision
        )));
    }
    if args.headers.iter().any(|h| h.uuid.is_empty()) {
        return Err(ServerError::InvalidRequest("header without uuid".into()));
    }
    if args
        .entries
        .iter()
        .any(|e| e.uuid.is_empty() || e.header_uuid.is_empty())
    {
        return Err(ServerError::InvalidRequest(
            "entry without uuid or header_uuid".into(),
        ));
    }
    Ok(())
}

async fn store_header(
    conn: &mut SqliteConnection,
    owner: &str,
    revision: i64,
    header: &HeaderRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO headers (owner, header_uuid, revision, handle, header, active, creation_date, data)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(owner, header_uuid) DO UPDATE SET
            revision = excluded.revision,
            handle = excluded.handle,
            header = excluded.header,
            active = excluded.active,
            creation_date = excluded.creation_date,
            data = excluded.data
        "#,
    )
    .bind(owner)
    .bind(header.uuid.as_str())
    .bind(revision)
    .bind(&header.handle)
    .bind(&header.header)
    .bind(header.active)
    .bind(header.creation_date.to_rfc3339())
    .bind(format_data(header.data.as_ref()))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn store_entry(
    conn: &mut SqliteConnection,
    owner: &str,
    revision: i64,
    entry: &EntryRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO entries (owner, entry_uuid, revision, header_uuid, start_time, end_time, data)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(owner, entry_uuid) DO UPDATE SET
            revision = excluded.revision,
            header_uuid = excluded.header_uuid,
            start_time = excluded.start_time,
            end_time = excluded.end_time,
            data = excluded.data
        "#,
    )
    .bind(owner)
    .bind(entry.uuid.as_str())
    .bind(revision)
    .bind(entry.header_uuid.as_str())
    .bind(entry.start.to_rfc3339())
    .bind(entry.end.map(|end| end.to_rfc3339()))
    .bind(format_data(entry.data.as_ref()))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn format_data(data: Option<&Map<String, Value>>) -> Option<String> {
    data.map(|d| Value::Object(d.clone()).to_string())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, ServerError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ServerError::Database(sqlx::Error::Decode(e.into())))
}

fn parse_data(s: Option<&str>) -> Result<Option<Map<String, Value>>, ServerError> {
    match s {
        None => Ok(None),
        Some(s) => serde_json::from_str(s)
            .map_err(|e| ServerError::Database(sqlx::Error::Decode(e.into()))),
    }
}
