//! Sync CLI commands for synchronizing with the server.

use clap::{Args, Subcommand};
use punch::config::Config;
use punch_core::sync::sync_status;
use punch_core::{HttpTransport, SyncEngine, SyncError, SyncReport};
use sqlx::SqlitePool;

/// Sync with remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration, ledger revision and pending changes
    Status,
}

impl SyncCommand {
    pub async fn run(&self, pool: &SqlitePool, config: &Config) -> Result<(), SyncCommandError> {
        match &self.command {
            None => self.sync(pool, config).await,
            Some(SyncSubcommand::Status) => self.status(pool, config).await,
        }
    }

    async fn sync(&self, pool: &SqlitePool, config: &Config) -> Result<(), SyncCommandError> {
        let report = run_round(pool, config).await?;

        println!("{}", report);
        for uuid in &report.overwritten {
            println!("  ! local edit of {} replaced by server copy", uuid);
        }
        if !report.applied {
            println!("Already up to date.");
        }

        Ok(())
    }

    async fn status(&self, pool: &SqlitePool, config: &Config) -> Result<(), SyncCommandError> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        let status = sync_status(pool).await?;

        if config.sync.is_configured() {
            println!("Endpoint:  {}", config.sync.endpoint.as_deref().unwrap_or_default());
            println!("Owner:     {}", config.sync.owner());
            println!(
                "Auto-sync: {}",
                if config.sync.auto_sync {
                    "enabled"
                } else {
                    "disabled"
                }
            );
        } else {
            println!("Status: Not configured");
            println!();
            println!("To enable sync, add to your config file:");
            println!();
            println!("  sync:");
            println!("    endpoint: \"http://localhost:8080/rpc\"");
            println!("    owner: \"your-name\"");
            println!("    key: \"your-key\"");
            println!("    auto_sync: false");
            println!();
            println!("Or set environment variables:");
            println!("  PUNCH_SYNC_URL");
            println!("  PUNCH_SYNC_OWNER");
            println!("  PUNCH_SYNC_KEY");
        }
        println!();

        println!("Revision:  {}", status.revision);
        println!(
            "Pending:   {} header(s), {} entr{}",
            status.pending.headers,
            status.pending.entries,
            if status.pending.entries == 1 { "y" } else { "ies" }
        );

        Ok(())
    }
}

/// Runs one sync round with the configured endpoint and credentials.
pub async fn run_round(pool: &SqlitePool, config: &Config) -> Result<SyncReport, SyncCommandError> {
    let transport = HttpTransport::new(config.sync.endpoint.as_deref(), config.sync.timeout())?;
    let engine = SyncEngine::new(
        pool.clone(),
        transport,
        config.sync.owner(),
        config.sync.key(),
    )
    .with_retry(config.sync.retry_policy());

    Ok(engine.sync().await?)
}

/// Runs a round after a write command if `auto_sync` is enabled.
///
/// Failures are printed and otherwise ignored; the command that triggered the
/// round has already succeeded and the next round will pick up its changes.
pub async fn try_auto_sync(pool: &SqlitePool, config: &Config) {
    if !config.sync.auto_sync || !config.sync.is_configured() {
        return;
    }

    match run_round(pool, config).await {
        Ok(report) => {
            tracing::debug!("auto-sync: {}", report);
            for uuid in &report.overwritten {
                eprintln!("Auto-sync: local edit of {} replaced by server copy", uuid);
            }
        }
        Err(e) => eprintln!("Auto-sync: {}", e),
    }
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    SyncError(SyncError),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::SyncError(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::SyncError(e) => Some(e),
        }
    }
}

impl From<SyncError> for SyncCommandError {
    fn from(e: SyncError) -> Self {
        SyncCommandError::SyncError(e)
    }
}
