use std::net::SocketAddr;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use punch::server::{router, ApiKeyStore, AppState, ServerStore};
use punch_core::ids::SequentialIds;
use punch_core::store::{init_db, EntryRepository, HeaderRepository};
use punch_core::sync::{sync_status, HttpTransport, RetryPolicy, SyncEngine, SyncError};
use punch_core::Revision;
use sqlx::SqlitePool;
use tempfile::TempDir;

fn at(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2016, 11, 1, hour, min, 0).unwrap()
}

/// Starts a server on an ephemeral port and returns its RPC endpoint.
async fn spawn_server(temp_dir: &TempDir) -> String {
    let store = ServerStore::open(&temp_dir.path().join("server.db"))
        .await
        .unwrap();
    let keys = ApiKeyStore::from_entries([("jorg", "secret")]);
    let app = router(AppState::new(store, keys));

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/rpc", addr)
}

struct Client {
    pool: SqlitePool,
    headers: HeaderRepository,
    entries: EntryRepository,
    ids: SequentialIds,
    _temp_dir: TempDir,
}

impl Client {
    async fn new(prefix: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("clock.db")).await.unwrap();
        Self {
            headers: HeaderRepository::new(pool.clone()),
            entries: EntryRepository::new(pool.clone()),
            pool,
            ids: SequentialIds::new(prefix),
            _temp_dir: temp_dir,
        }
    }

    fn engine(&self, endpoint: &str, key: &str) -> SyncEngine<HttpTransport> {
        let transport = HttpTransport::new(Some(endpoint), Duration::from_secs(5)).unwrap();
        SyncEngine::new(self.pool.clone(), transport, "jorg", key).with_retry(
            RetryPolicy::new(2)
                .with_initial_delay(Duration::from_millis(10))
                .with_jitter(false),
        )
    }
}

#[tokio::test]
async fn two_clients_converge_through_server() {
    let server_dir = TempDir::new().unwrap();
    let endpoint = spawn_server(&server_dir).await;

    let a = Client::new("a").await;
    let b = Client::new("b").await;

    a.headers
        .create(&a.ids, "Project X", Some("px"), at(8, 0))
        .await
        .unwrap();
    let started = a.entries.check_in(&a.ids, "@px", at(9, 0)).await.unwrap();

    let report = a.engine(&endpoint, "secret").sync().await.unwrap();
    assert_eq!(report.revision, 1);
    assert_eq!(report.pushed.headers, 1);
    assert_eq!(report.pushed.entries, 1);
    assert_eq!(report.fetched.headers, 0);

    let report = b.engine(&endpoint, "secret").sync().await.unwrap();
    assert_eq!(report.revision, 1);
    assert_eq!(report.fetched.headers, 1);
    assert_eq!(report.fetched.entries, 1);

    let running = b.entries.running().await.unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].entry.uuid, started.entry.uuid);
    assert_eq!(running[0].header.handle.as_deref(), Some("px"));

    b.entries.check_out(at(11, 30)).await.unwrap();
    let report = b.engine(&endpoint, "secret").sync().await.unwrap();
    assert_eq!(report.revision, 2);
    assert_eq!(report.pushed.entries, 1);
    assert_eq!(report.fetched.entries, 0);

    let report = a.engine(&endpoint, "secret").sync().await.unwrap();
    assert_eq!(report.previous_revision, 1);
    assert_eq!(report.revision, 2);
    assert_eq!(report.fetched.entries, 1);
    assert!(report.overwritten.is_empty());

    let on_a = a.entries.get(&started.entry.uuid).await.unwrap().unwrap();
    let on_b = b.entries.get(&started.entry.uuid).await.unwrap().unwrap();
    assert_eq!(on_a, on_b);
    assert_eq!(on_a.end.as_option(), Some(at(11, 30)));
    assert_eq!(on_a.revision, Revision::Committed(2));

    let report = a.engine(&endpoint, "secret").sync().await.unwrap();
    assert!(!report.applied);
    assert_eq!(report.revision, 2);
}

#[tokio::test]
async fn wrong_key_leaves_database_untouched() {
    let server_dir = TempDir::new().unwrap();
    let endpoint = spawn_server(&server_dir).await;

    let client = Client::new("a").await;
    client
        .headers
        .create(&client.ids, "Project X", None, at(8, 0))
        .await
        .unwrap();

    let err = client.engine(&endpoint, "wrong").sync().await.unwrap_err();
    assert!(matches!(err, SyncError::Protocol(_)), "got {:?}", err);

    let status = sync_status(&client.pool).await.unwrap();
    assert_eq!(status.revision, 0);
    assert_eq!(status.pending.headers, 1);
}

#[tokio::test]
async fn unreachable_server_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}/rpc", listener.local_addr().unwrap());
    drop(listener);

    let client = Client::new("a").await;
    client
        .headers
        .create(&client.ids, "Project X", None, at(8, 0))
        .await
        .unwrap();

    let err = client.engine(&endpoint, "secret").sync().await.unwrap_err();
    assert!(matches!(err, SyncError::Transport(_)), "got {:?}", err);

    let status = sync_status(&client.pool).await.unwrap();
    assert_eq!(status.revision, 0);
    assert_eq!(status.pending.headers, 1);
}
