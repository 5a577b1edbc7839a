//! vbus command-line interface.
//!
//! Runs scenarios on the deterministic virtual bus, records captures and
//! replays them.
//!
//! # Quick Start
//!
//! ```bash
//! # Validate a scenario and show the merged result
//! vbus check scenarios/highway.toml --print
//!
//! # Run it, keeping the frame capture and the analysis events
//! vbus run scenarios/highway.toml --seed 7 --capture run.jsonl --events events.jsonl
//!
//! # Replay the capture through the same analyzer
//! vbus replay run.jsonl --scenario scenarios/highway.toml
//! ```

mod commands;
mod style;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// vbus - deterministic virtual bus simulator.
#[derive(Parser)]
#[command(name = "vbus")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Run a scenario.
    Run {
        /// Path to the scenario TOML file.
        scenario: PathBuf,

        /// Override the scenario seed.
        #[arg(short, long)]
        seed: Option<u64>,

        /// Write every published frame to this JSON Lines capture.
        #[arg(short, long)]
        capture: Option<PathBuf>,

        /// Write analysis events to this JSON Lines file.
        #[arg(short, long)]
        events: Option<PathBuf>,

        /// Record scheduler decisions and save them to this file.
        #[arg(long)]
        trace: Option<PathBuf>,

        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Replay a JSON Lines capture through the bus and analyzer.
    Replay {
        /// Path to the capture file.
        capture: PathBuf,

        /// Scenario providing the clock mode, expectations and analyzer settings.
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Write analysis events to this JSON Lines file.
        #[arg(short, long)]
        events: Option<PathBuf>,

        /// Publish at most this many frames.
        #[arg(long)]
        limit: Option<usize>,

        /// Print the replay summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Validate a scenario without running it.
    Check {
        /// Path to the scenario TOML file.
        scenario: PathBuf,

        /// Print the merged scenario as TOML.
        #[arg(long)]
        print: bool,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    style::set_no_color(cli.no_color);

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Run {
            scenario,
            seed,
            capture,
            events,
            trace,
            json,
        } => commands::run::run(&commands::run::RunOptions {
            scenario,
            seed,
            capture,
            events,
            trace,
            json,
        }),
        Commands::Replay {
            capture,
            scenario,
            events,
            limit,
            json,
        } => commands::replay::run(&commands::replay::ReplayOptions {
            capture,
            scenario,
            events,
            limit,
            json,
        }),
        Commands::Check { scenario, print } => commands::check::run(&scenario, print),
    }
}
