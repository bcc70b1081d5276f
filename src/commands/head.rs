use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use punch_core::{Header, HeaderRepository, IdGenerator};
use serde::Serialize;

use super::OutputFormat;

#[derive(Args)]
pub struct HeadCommand {
    #[command(subcommand)]
    pub command: HeadSubcommand,
}

#[derive(Subcommand)]
pub enum HeadSubcommand {
    /// Create a header to clock time against
    Add {
        /// Title, optionally preceded by @handle
        #[arg(required = true, num_args = 1..)]
        words: Vec<String>,
    },

    /// List headers
    List {
        /// Include deactivated headers
        #[arg(long, short)]
        all: bool,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Change a header's title
    Rename {
        /// @handle or part of the title
        header: String,

        /// New title
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },

    /// Hide a header from lookups; its entries are kept
    Deactivate {
        /// @handle or part of the title
        header: String,
    },
}

/// Header plus its sync state, for JSON output.
#[derive(Serialize)]
struct HeaderView<'a> {
    #[serde(flatten)]
    header: &'a Header,
    revision: Option<i64>,
}

impl HeadCommand {
    /// Whether running this command changes the database.
    pub fn writes(&self) -> bool {
        !matches!(self.command, HeadSubcommand::List { .. })
    }

    pub async fn run(
        &self,
        repo: &HeaderRepository,
        ids: &dyn IdGenerator,
        now: DateTime<Utc>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            HeadSubcommand::Add { words } => {
                let (handle, title) = split_handle(words);
                let header = repo.create(ids, &title, handle, now).await?;
                println!("Created header: {}", header);
                Ok(())
            }

            HeadSubcommand::List { all, format } => {
                let headers = repo.list(*all).await?;

                match format {
                    OutputFormat::Json => {
                        let views: Vec<_> = headers
                            .iter()
                            .map(|header| HeaderView {
                                header,
                                revision: header.revision.committed(),
                            })
                            .collect();
                        println!("{}", serde_json::to_string_pretty(&views)?);
                    }
                    OutputFormat::Text => {
                        if headers.is_empty() {
                            println!("No headers found");
                            return Ok(());
                        }
                        println!("{:<12}  {:<40}  SYNC", "HANDLE", "TITLE");
                        println!("{}", "-".repeat(64));
                        for header in &headers {
                            let handle = header
                                .handle
                                .as_ref()
                                .map(|h| format!("@{}", h))
                                .unwrap_or_default();
                            let title = if header.active {
                                header.title.clone()
                            } else {
                                format!("{} (inactive)", header.title)
                            };
                            println!("{:<12}  {:<40}  {}", handle, title, header.revision);
                        }
                        println!("\nTotal: {} header(s)", headers.len());
                    }
                }
                Ok(())
            }

            HeadSubcommand::Rename { header, title } => {
                let renamed = repo.rename(header, &title.join(" ")).await?;
                println!("Renamed header: {}", renamed);
                Ok(())
            }

            HeadSubcommand::Deactivate { header } => {
                let header = repo.deactivate(header).await?;
                println!("Deactivated header: {}", header);
                Ok(())
            }
        }
    }
}

/// Splits a leading `@handle` off the words of a new header.
fn split_handle(words: &[String]) -> (Option<&str>, String) {
    match words.split_first() {
        Some((first, rest)) if first.starts_with('@') && !rest.is_empty() => {
            (Some(first.as_str()), rest.join(" "))
        }
        _ => (None, words.join(" ")),
    }
}
