use clap::ValueEnum;

mod clock;
mod config_cmd;
mod head;
mod sum;
mod sync_cmd;

pub use clock::{effective_time, InCommand, OutCommand, RunningCommand, SwitchCommand};
pub use config_cmd::ConfigCommand;
pub use head::HeadCommand;
pub use sum::SumCommand;
pub use sync_cmd::{try_auto_sync, SyncCommand};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
