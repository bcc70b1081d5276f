use clap::{Args, Subcommand};
use punch::config::Config;

use super::OutputFormat;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!(
                            "database_path: {}",
                            config.database_path.value.display()
                        );
                        println!("  source: {}", config.database_path.source);
                        println!();

                        let sync = &config.sync;
                        println!(
                            "sync.endpoint: {}",
                            sync.endpoint.as_deref().unwrap_or("(not set)")
                        );
                        println!("sync.owner: {}", sync.owner.as_deref().unwrap_or("(not set)"));
                        println!(
                            "sync.key: {}",
                            if sync.key.is_some() { "********" } else { "(not set)" }
                        );
                        println!("sync.timeout_secs: {}", sync.timeout_secs);
                        println!("sync.max_attempts: {}", sync.max_attempts);
                        println!("sync.auto_sync: {}", sync.auto_sync);
                    }
                }
                Ok(())
            }
        }
    }
}
