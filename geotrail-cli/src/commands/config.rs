//! Configuration management CLI commands.

use std::path::PathBuf;

use clap::Subcommand;

use geotrail::config::{ConfigFile, StorageKind};

use crate::error::CliError;

/// Config action subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show {
        /// Configuration file path (default: platform config directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write a default configuration file
    Init {
        /// Destination path (default: platform config directory)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(action: ConfigAction) -> Result<(), CliError> {
    match action {
        ConfigAction::Show { config } => show(config),
        ConfigAction::Init { path, force } => init(path, force),
    }
}

fn show(path: Option<PathBuf>) -> Result<(), CliError> {
    let config = match &path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    let source = path
        .or_else(ConfigFile::default_path)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<defaults>".to_string());

    println!("Configuration ({})", source);
    println!("  bind:             {}", config.server.bind);
    println!("  trip_gap_secs:    {}", config.tracking.trip_gap_secs);
    println!("  min_distance_m:   {}", config.tracking.min_distance_m);
    println!("  history_capacity: {}", config.tracking.history_capacity);
    let storage = match config.storage.kind {
        StorageKind::Memory => "memory".to_string(),
        StorageKind::Jsonl => format!(
            "jsonl ({})",
            config
                .storage
                .path
                .unwrap_or_else(ConfigFile::default_trip_log_path)
                .display()
        ),
    };
    println!("  storage:          {}", storage);
    println!(
        "  channel_capacity: {}",
        config.broadcast.channel_capacity
    );
    match config.log.directory {
        Some(dir) => println!("  log directory:    {}", dir.display()),
        None => println!("  log directory:    <stderr>"),
    }
    Ok(())
}

fn init(path: Option<PathBuf>, force: bool) -> Result<(), CliError> {
    let path = path
        .or_else(ConfigFile::default_path)
        .ok_or_else(|| CliError::ConfigCommand("No config directory available".to_string()))?;

    if path.exists() && !force {
        return Err(CliError::ConfigCommand(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    ConfigFile::default().save(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_writes_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geotrail.ini");

        init(Some(path.clone()), false).unwrap();
        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, ConfigFile::default());
    }

    #[test]
    fn test_init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geotrail.ini");

        init(Some(path.clone()), false).unwrap();
        let err = init(Some(path.clone()), false).unwrap_err();
        assert!(err.to_string().contains("already exists"));

        init(Some(path), true).unwrap();
    }

    #[test]
    fn test_show_reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geotrail.ini");
        std::fs::write(&path, "[server]\nbind = 0.0.0.0:9999\n").unwrap();

        show(Some(path)).unwrap();
    }
}
