//! Tuskwatch CLI - Command-line interface
//!
//! Runs the WebSocket tracking server, headless tracking sessions, and
//! zone/configuration maintenance commands on top of the tuskwatch library.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use commands::common::SourceArg;
use commands::config::ConfigCommands;
use commands::run::RunArgs;
use commands::serve::ServeArgs;
use commands::zones::ZonesCommands;
use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "tuskwatch")]
#[command(about = "Geofence alerts and live position streaming for wildlife tracking", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file to use instead of ~/.tuskwatch/config.ini
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. debug or tuskwatch=trace (overrides config)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the WebSocket server for map clients
    Serve {
        /// Frame source (default from config)
        #[arg(long, value_enum)]
        source: Option<SourceArg>,

        /// Recorded tracking file; implies --source replay
        #[arg(long)]
        file: Option<PathBuf>,

        /// Listen address, e.g. 0.0.0.0:8765
        #[arg(long)]
        bind: Option<String>,

        /// Zones JSON file loaded at startup
        #[arg(long)]
        zones: Option<PathBuf>,

        /// Frames per second
        #[arg(long)]
        fps: Option<f64>,
    },

    /// Run one tracking session in the terminal
    Run {
        /// Frame source (default from config)
        #[arg(long, value_enum)]
        source: Option<SourceArg>,

        /// Recorded tracking file; implies --source replay
        #[arg(long)]
        file: Option<PathBuf>,

        /// Zones JSON file
        #[arg(long)]
        zones: Option<PathBuf>,

        /// Frames per second
        #[arg(long)]
        fps: Option<f64>,
    },

    /// Inspect and validate zones
    Zones {
        #[command(subcommand)]
        command: ZonesCommands,
    },

    /// View and modify configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = execute(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn execute(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve {
            source,
            file,
            bind,
            zones,
            fps,
        } => {
            let runner = CliRunner::new(config_path, cli.log_level.as_deref())?;
            commands::serve::run(
                &runner,
                ServeArgs {
                    source,
                    file,
                    bind,
                    zones,
                    fps,
                },
            )
        }
        Commands::Run {
            source,
            file,
            zones,
            fps,
        } => {
            let runner = CliRunner::new(config_path, cli.log_level.as_deref())?;
            commands::run::run(
                &runner,
                RunArgs {
                    source,
                    file,
                    zones,
                    fps,
                },
            )
        }
        Commands::Zones { command } => commands::zones::run(command, config_path),
        Commands::Config { command } => commands::config::run(command, config_path),
    }
}
