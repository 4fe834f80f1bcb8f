//! GeoTrail CLI - command-line interface and HTTP adapter
//!
//! This binary starts the tracking server and provides configuration
//! management commands on top of the `geotrail` library.

mod commands;
mod error;
mod http;
mod logging;

use clap::{Parser, Subcommand};

use commands::config::ConfigAction;
use commands::start::StartArgs;
use error::CliError;

/// Live geolocation tracking with trip segmentation.
#[derive(Debug, Parser)]
#[command(name = "geotrail", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the tracking server (default)
    Start(StartArgs),
    /// Configuration file management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Command::Start(args)) => commands::start::run(args),
        Some(Command::Config { action }) => commands::config::run(action),
        None => commands::start::run(StartArgs::default()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
