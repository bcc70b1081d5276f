//! Time clocked per header over a period.

use chrono::{DateTime, Datelike, Days, Local, Months, NaiveDate, TimeDelta, TimeZone, Utc};
use clap::Args;
use punch_core::{EntryRepository, Header, HeaderTotal};
use serde::Serialize;

use super::clock::format_duration;
use super::OutputFormat;

/// Sum up clocked time per header
#[derive(Args)]
pub struct SumCommand {
    /// today, yesterday, week, month, year or all, each optionally followed
    /// by -N to go N periods back (week-1 is last week); or a date
    /// YYYY-MM-DD; or a range FROM..TO of dates, both included
    #[arg(default_value = "week")]
    frame: String,

    /// Only headers whose title contains this text
    filter: Option<String>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

/// Header total, for JSON output.
#[derive(Serialize)]
struct TotalView<'a> {
    #[serde(flatten)]
    header: &'a Header,
    minutes: i64,
    entries: usize,
}

impl SumCommand {
    pub async fn run(
        &self,
        repo: &EntryRepository,
        now: DateTime<Utc>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let today = now.with_timezone(&Local).date_naive();
        let frame = TimeFrame::parse(&self.frame, today)?;
        let (from, to) = frame.bounds(&Local)?;

        let totals = repo.totals(from, to, self.filter.as_deref(), now).await?;

        match self.format {
            OutputFormat::Json => {
                let views: Vec<_> = totals
                    .iter()
                    .map(|total| TotalView {
                        header: &total.header,
                        minutes: total.duration.num_minutes(),
                        entries: total.entries,
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&views)?);
            }
            OutputFormat::Text => {
                println!("Headers: {}", frame);
                for line in report_lines(&totals) {
                    println!("{}", line);
                }
            }
        }
        Ok(())
    }
}

fn report_lines(totals: &[HeaderTotal]) -> Vec<String> {
    let mut lines: Vec<String> = totals
        .iter()
        .map(|total| format!("{:>9}  {}", format_duration(total.duration), total.header))
        .collect();
    let sum = totals
        .iter()
        .fold(TimeDelta::zero(), |acc, total| acc + total.duration);
    lines.push(format!("{:>9}  Total", format_duration(sum)));
    lines
}

/// A run of whole local days; `to` is the first day not included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFrame {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl TimeFrame {
    /// Reads a frame relative to `today`.
    pub fn parse(spec: &str, today: NaiveDate) -> Result<Self, String> {
        let spec = spec.trim();

        if let Some((first, last)) = spec.split_once("..") {
            let from = parse_date(first)?;
            let to = next_day(parse_date(last)?)?;
            if to <= from {
                return Err(format!("'{}' ends before it starts", spec));
            }
            return Ok(Self { from, to });
        }

        if let Ok(day) = NaiveDate::parse_from_str(spec, "%Y-%m-%d") {
            return Ok(Self {
                from: day,
                to: next_day(day)?,
            });
        }

        let (unit, back) = match spec.split_once('-') {
            Some((unit, n)) => {
                let n = n
                    .parse::<u32>()
                    .map_err(|_| format!("'{}' is not a number of periods", n))?;
                (unit, n)
            }
            None => (spec, 0),
        };
        let out_of_range = || format!("'{}' is out of range", spec);

        match unit {
            "today" | "day" => {
                let from = today
                    .checked_sub_days(Days::new(back.into()))
                    .ok_or_else(out_of_range)?;
                Ok(Self {
                    from,
                    to: next_day(from)?,
                })
            }
            "yesterday" => {
                let from = today
                    .checked_sub_days(Days::new(u64::from(back) + 1))
                    .ok_or_else(out_of_range)?;
                Ok(Self {
                    from,
                    to: next_day(from)?,
                })
            }
            "" | "week" => {
                let monday = u64::from(today.weekday().num_days_from_monday());
                let from = today
                    .checked_sub_days(Days::new(monday + 7 * u64::from(back)))
                    .ok_or_else(out_of_range)?;
                let to = from.checked_add_days(Days::new(7)).ok_or_else(out_of_range)?;
                Ok(Self { from, to })
            }
            "month" => {
                let from = today
                    .with_day(1)
                    .and_then(|first| first.checked_sub_months(Months::new(back)))
                    .ok_or_else(out_of_range)?;
                let to = from
                    .checked_add_months(Months::new(1))
                    .ok_or_else(out_of_range)?;
                Ok(Self { from, to })
            }
            "year" => {
                let year = i32::try_from(back)
                    .ok()
                    .and_then(|back| today.year().checked_sub(back))
                    .ok_or_else(out_of_range)?;
                let from = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(out_of_range)?;
                let to = NaiveDate::from_ymd_opt(year + 1, 1, 1).ok_or_else(out_of_range)?;
                Ok(Self { from, to })
            }
            "all" => Ok(Self {
                from: NaiveDate::from_ymd_opt(1970, 1, 1).ok_or_else(out_of_range)?,
                to: next_day(today)?,
            }),
            _ => Err(format!(
                "unknown time frame '{}'; use today, yesterday, week, month, year, all or FROM..TO",
                spec
            )),
        }
    }

    /// Start of `from` and start of `to` in `tz`, as UTC instants.
    pub fn bounds<Tz: TimeZone>(&self, tz: &Tz) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
        Ok((midnight(self.from, tz)?, midnight(self.to, tz)?))
    }
}

impl std::fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let last = self.to.pred_opt().unwrap_or(self.to);
        write!(f, "{} -- {}", self.from, last)
    }
}

fn parse_date(text: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|_| format!("'{}' is not a date (YYYY-MM-DD)", text.trim()))
}

fn next_day(day: NaiveDate) -> Result<NaiveDate, String> {
    day.succ_opt().ok_or_else(|| format!("{} is out of range", day))
}

/// First instant of `day` in `tz`; skips forward when midnight falls in a DST gap.
fn midnight<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> Result<DateTime<Utc>, String> {
    (0..3)
        .filter_map(|hour| day.and_hms_opt(hour, 0, 0))
        .find_map(|local| tz.from_local_datetime(&local).earliest())
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| format!("no local midnight on {}", day))
}
