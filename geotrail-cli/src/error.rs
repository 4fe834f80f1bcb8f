//! CLI error types.

use std::fmt;

use geotrail::config::ConfigError;

/// Errors surfaced to the terminal.
#[derive(Debug)]
pub enum CliError {
    /// Configuration file could not be read or written.
    Config(ConfigError),

    /// Failed to create the Tokio runtime.
    Runtime(String),

    /// Failed to start the tracking pipeline.
    App(String),

    /// Failed to bind the listen address.
    Bind {
        /// Address requested.
        addr: String,
        /// Underlying error text.
        message: String,
    },

    /// The HTTP server stopped with an error.
    Serve(String),

    /// A config subcommand refused to act.
    ConfigCommand(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Runtime(msg) => write!(f, "Failed to create Tokio runtime: {}", msg),
            CliError::App(msg) => write!(f, "Failed to start tracking pipeline: {}", msg),
            CliError::Bind { addr, message } => {
                write!(f, "Failed to bind {}: {}", addr, message)
            }
            CliError::Serve(msg) => write!(f, "Server error: {}", msg),
            CliError::ConfigCommand(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}
