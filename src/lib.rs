mod db;
mod error;
mod settings;
pub mod tracker;
mod utils;

use std::io::Write;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use log::info;

pub use db::{
    Database, NightSummary, NightsSnapshot, NightsStream, SessionRecord, SessionStore,
    SleepQuality, QUALITY_UNSET,
};
pub use error::{Error, Result};
pub use settings::{SettingsStore, TrackerSettings};
pub use tracker::{
    Clock, CommandReceipt, SessionCoordinator, SystemClock, TrackerStatus, Transition,
};

use tracker::commands::{
    clear_nights, format_night, list_nights, rate_night, start_tracking, stop_tracking,
    tracker_status,
};

pub(crate) struct AppState {
    pub(crate) db: Database,
    pub(crate) tracker: SessionCoordinator<Database>,
    pub(crate) settings: SettingsStore,
}

#[derive(Parser, Debug)]
#[command(name = "sleeplog", version, about = "Track sleep sessions from the terminal")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start tracking tonight
    Start,
    /// Stop the night being tracked
    Stop,
    /// Rate the night being tracked (0 = very bad .. 5 = excellent)
    Quality {
        #[arg(value_parser = clap::value_parser!(i32).range(0..=5))]
        value: i32,
    },
    /// Delete every recorded night
    Clear,
    /// Show whether a night is being tracked
    Status,
    /// List recorded nights, newest first
    History,
    /// Print the night list every time it changes (Ctrl-C to exit)
    Watch,
}

pub fn run() -> anyhow::Result<()> {
    let default_level = if settings::debug_enabled() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(execute(cli))
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let data_dir = settings::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let settings = SettingsStore::new(data_dir.join("settings.json"))?;
    let db = Database::new(settings.database_path(&data_dir))?;
    let tracker = SessionCoordinator::new(db.clone());
    tracker.initialize().await?;

    info!("Tracker ready ({:?})", tracker.status());

    let state = AppState {
        db,
        tracker,
        settings,
    };

    let outcome = dispatch(&state, cli.command).await;
    state.tracker.shutdown().await;
    outcome
}

async fn dispatch(state: &AppState, command: Command) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    match command {
        Command::Start => {
            let message = start_tracking(state).await.map_err(anyhow::Error::msg)?;
            writeln!(stdout, "{message}")?;
        }
        Command::Stop => {
            let message = stop_tracking(state).await.map_err(anyhow::Error::msg)?;
            writeln!(stdout, "{message}")?;
        }
        Command::Quality { value } => {
            let message = rate_night(state, value).await.map_err(anyhow::Error::msg)?;
            writeln!(stdout, "{message}")?;
        }
        Command::Clear => {
            let message = clear_nights(state).await.map_err(anyhow::Error::msg)?;
            writeln!(stdout, "{message}")?;
        }
        Command::Status => writeln!(stdout, "{}", tracker_status(state))?,
        Command::History => {
            let rows = list_nights(state).await.map_err(anyhow::Error::msg)?;
            if rows.is_empty() {
                writeln!(stdout, "No nights recorded")?;
            }
            for row in rows {
                writeln!(stdout, "{row}")?;
            }
        }
        Command::Watch => {
            let mut history = state.tracker.history_summaries().await?;
            loop {
                tokio::select! {
                    snapshot = history.next() => {
                        let Some(nights) = snapshot else { break };
                        writeln!(stdout, "--- {} night(s)", nights.len())?;
                        for night in &nights {
                            writeln!(stdout, "{}", format_night(night))?;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quality_within_range() {
        let cli = Cli::try_parse_from(["sleeplog", "quality", "4"]).unwrap();
        assert!(matches!(cli.command, Command::Quality { value: 4 }));
    }

    #[test]
    fn rejects_quality_out_of_range() {
        assert!(Cli::try_parse_from(["sleeplog", "quality", "6"]).is_err());
        assert!(Cli::try_parse_from(["sleeplog", "quality", "-1"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
