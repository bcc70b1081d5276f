use clap::{Parser, Subcommand};
use punch::config::Config;
use punch_core::{init_db, EntryRepository, HeaderRepository, RandomIds};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{
    effective_time, try_auto_sync, ConfigCommand, HeadCommand, InCommand, OutCommand,
    RunningCommand, SumCommand, SwitchCommand, SyncCommand,
};

#[derive(Parser)]
#[command(name = "punch")]
#[command(version)]
#[command(about = "A time clock with revision-based sync", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Let a clock command take effect this many minutes ago
    #[arg(
        long = "mod",
        global = true,
        value_name = "MINUTES",
        default_value_t = 0,
        allow_negative_numbers = true
    )]
    minutes_ago: i64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage headers (projects)
    Head(HeadCommand),

    In(InCommand),

    Out(OutCommand),

    Switch(SwitchCommand),

    Running(RunningCommand),

    Sum(SumCommand),

    /// Sync with the server
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    let Some(command) = cli.command else {
        println!("Use --help to see available commands");
        return Ok(());
    };

    if let Commands::Config(cmd) = &command {
        return cmd.run(&config);
    }

    let pool = init_db(&config.database_path.value).await?;
    let ids = RandomIds;
    let now = chrono::Utc::now();

    let wrote = match command {
        Commands::Head(cmd) => {
            let repo = HeaderRepository::new(pool.clone());
            cmd.run(&repo, &ids, now).await?;
            cmd.writes()
        }
        Commands::In(cmd) => {
            let repo = EntryRepository::new(pool.clone());
            cmd.run(&repo, &ids, effective_time(now, cli.minutes_ago)?)
                .await?;
            true
        }
        Commands::Out(cmd) => {
            let repo = EntryRepository::new(pool.clone());
            cmd.run(&repo, effective_time(now, cli.minutes_ago)?).await?;
            true
        }
        Commands::Switch(cmd) => {
            let repo = EntryRepository::new(pool.clone());
            cmd.run(&repo).await?;
            true
        }
        Commands::Running(cmd) => {
            let repo = EntryRepository::new(pool.clone());
            cmd.run(&repo, now).await?;
            false
        }
        Commands::Sum(cmd) => {
            let repo = EntryRepository::new(pool.clone());
            cmd.run(&repo, now).await?;
            false
        }
        Commands::Sync(cmd) => {
            cmd.run(&pool, &config).await?;
            false
        }
        Commands::Config(_) => false,
    };

    if wrote {
        try_auto_sync(&pool, &config).await;
    }

    Ok(())
}
