//! Punch Sync Server
//!
//! Serves `T.Sync` for any number of owners out of one SQLite database.
//!
//! # Configuration
//!
//! Environment variables:
//! - `PUNCH_PORT`: Port to listen on (default: 8080)
//! - `PUNCH_SERVER_DB`: Server database (default: ~/.local/share/punch-server/server.db)
//! - `PUNCH_SERVER_KEYS`: Keys file (default: ~/.config/punch-server/keys.yaml)
//!
//! # Keys File Format
//!
//! ```yaml
//! keys:
//!   - owner: "jorg"
//!     key: "your-secret-key-here"
//! ```
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint
//! - `POST /rpc`: JSON-RPC endpoint for `T.Sync`

use std::net::SocketAddr;
use std::path::PathBuf;

use punch::server::{router, ApiKeyStore, AppState, ServerStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Server configuration
#[derive(Debug, Clone)]
struct Config {
    port: u16,
    database_path: PathBuf,
    keys_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let port = std::env::var("PUNCH_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let database_path = std::env::var("PUNCH_SERVER_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("punch-server")
                    .join("server.db")
            });

        let keys_path = std::env::var("PUNCH_SERVER_KEYS")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("punch-server")
                    .join("keys.yaml")
            });

        Self {
            port,
            database_path,
            keys_path,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "punch=info,punch_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    tracing::info!("Database: {}", config.database_path.display());
    tracing::info!("Keys file: {}", config.keys_path.display());

    let store = match ServerStore::open(&config.database_path).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };
    let keys = ApiKeyStore::load(&config.keys_path);

    let app = router(AppState::new(store, keys));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
