//! Clocking in and out.

use chrono::{DateTime, DurationRound, Local, TimeDelta, Utc};
use clap::Args;
use punch_core::store::RunningEntry;
use punch_core::{EntryRepository, IdGenerator};

/// Start the clock on a header, closing whatever is running
#[derive(Args)]
pub struct InCommand {
    /// @handle or part of the title
    #[arg(required = true, num_args = 1..)]
    header: Vec<String>,
}

/// Stop every running clock
#[derive(Args)]
pub struct OutCommand {}

/// Move the running clock to another header
#[derive(Args)]
pub struct SwitchCommand {
    /// @handle or part of the title
    #[arg(required = true, num_args = 1..)]
    header: Vec<String>,
}

/// Show what is running
#[derive(Args)]
pub struct RunningCommand {}

impl InCommand {
    pub async fn run(
        &self,
        repo: &EntryRepository,
        ids: &dyn IdGenerator,
        at: DateTime<Utc>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let running = repo.check_in(ids, &self.header.join(" "), at).await?;
        println!(
            "Checked in to {} at {}",
            running.header,
            local_time(running.entry.start)
        );
        Ok(())
    }
}

impl OutCommand {
    pub async fn run(
        &self,
        repo: &EntryRepository,
        at: DateTime<Utc>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        for entry in repo.check_out(at).await? {
            println!(
                "Checked out at {} ({})",
                local_time(at),
                format_duration(entry.duration(at))
            );
        }
        Ok(())
    }
}

impl SwitchCommand {
    pub async fn run(&self, repo: &EntryRepository) -> Result<(), Box<dyn std::error::Error>> {
        let running = repo.switch(&self.header.join(" ")).await?;
        println!(
            "Switched to {} (running since {})",
            running.header,
            local_time(running.entry.start)
        );
        Ok(())
    }
}

impl RunningCommand {
    pub async fn run(
        &self,
        repo: &EntryRepository,
        now: DateTime<Utc>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let running = repo.running().await?;
        if running.is_empty() {
            println!("Nothing running");
        }
        for item in &running {
            println!("{}", describe_running(item, now));
        }
        Ok(())
    }
}

fn describe_running(item: &RunningEntry, now: DateTime<Utc>) -> String {
    format!(
        "{} since {} ({})",
        item.header,
        local_time(item.entry.start),
        format_duration(item.entry.duration(now))
    )
}

/// The time a clock command takes effect: `minutes_ago` before `now`,
/// rounded to the minute.
pub fn effective_time(
    now: DateTime<Utc>,
    minutes_ago: i64,
) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    let offset = TimeDelta::try_minutes(minutes_ago)
        .ok_or_else(|| format!("--mod {} is out of range", minutes_ago))?;
    let at = now
        .checked_sub_signed(offset)
        .ok_or_else(|| format!("--mod {} is out of range", minutes_ago))?;
    Ok(at.duration_round(TimeDelta::minutes(1))?)
}

/// Formats a duration as `1h 05m`; negative durations count as zero.
pub(super) fn format_duration(duration: TimeDelta) -> String {
    let minutes = duration.num_minutes().max(0);
    format!("{}h {:02}m", minutes / 60, minutes % 60)
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}
