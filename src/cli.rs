use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};

#[derive(Debug, Parser)]
#[command(
    name = "franchise-ingest",
    version,
    about = "Classify, locate, merge and persist franchise-league JSON exports"
)]
struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest one document from a file or stdin.
    Ingest {
        /// Path to the JSON document; omit or pass `-` for stdin.
        file: Option<PathBuf>,
        /// Routing hint, e.g. `ps5/17287266/week/reg/3/schedules`.
        #[arg(long)]
        hint: String,
        /// Treat the delivery as a replay (not captured).
        #[arg(long)]
        replay: bool,
        /// Leave roster chunks buffered instead of flushing before exit.
        #[arg(long)]
        no_flush: bool,
    },
    /// Re-ingest every delivery from a capture log.
    Replay {
        /// Capture log; defaults to `{root}/webhook_debug.log`.
        capture: Option<PathBuf>,
    },
    /// Process inbox envelopes once, or keep polling as a daemon.
    Watch {
        #[arg(long)]
        once: bool,
        #[arg(long)]
        daemon: bool,
    },
    /// Show paths, config, daemon lock and league pointers.
    Status,
    /// Show the current (season, week) pointer for a league.
    Location { league: String },
    /// Rebuild a league's roster aggregate from per-team snapshots.
    RebuildRosters { league: String },
}

fn render(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    let state = if report.ok { "ok" } else { "failed" };
    println!("{}: {state}", report.command);
    for detail in &report.details {
        println!("  {detail}");
    }
    if !report.issues.is_empty() {
        println!("issues:");
        for issue in &report.issues {
            println!("  - {issue}");
        }
    }
    Ok(())
}

/// Parse arguments, run the command and return the process exit code.
pub fn run() -> Result<i32> {
    let cli = Cli::parse();
    let report = match &cli.command {
        Command::Ingest {
            file,
            hint,
            replay,
            no_flush,
        } => commands::ingest::run(&commands::ingest::IngestOptions {
            file: file.clone(),
            hint: hint.clone(),
            replay: *replay,
            no_flush: *no_flush,
        })?,
        Command::Replay { capture } => commands::replay::run(&commands::replay::ReplayOptions {
            capture: capture.clone(),
        })?,
        Command::Watch { once, daemon } => commands::watch::run(&commands::watch::WatchOptions {
            once: *once,
            daemon: *daemon,
        })?,
        Command::Status => commands::status::run()?,
        Command::Location { league } => commands::location::run(league)?,
        Command::RebuildRosters { league } => commands::rebuild_rosters::run(league)?,
    };
    render(&report, cli.json)?;
    Ok(if report.ok { 0 } else { 2 })
}
