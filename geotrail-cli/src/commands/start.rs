//! The `start` command: run the tracking server.

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use geotrail::app::{AppConfig, TrackerApp};
use geotrail::config::{ConfigFile, StorageKind};

use crate::error::CliError;
use crate::{http, logging};

/// Arguments for `geotrail start`.
#[derive(Debug, Default, Args)]
pub struct StartArgs {
    /// Configuration file path (default: platform config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Listen address, overriding the configuration file
    #[arg(long)]
    pub bind: Option<String>,

    /// Persist trips to a JSON-lines log at this path
    #[arg(long)]
    pub trip_log: Option<PathBuf>,
}

/// Run the server until interrupted.
pub fn run(args: StartArgs) -> Result<(), CliError> {
    let mut config = match &args.config {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(path) = args.trip_log {
        config.storage.kind = StorageKind::Jsonl;
        config.storage.path = Some(path);
    }

    // Keep the guard alive for the process lifetime; dropping it would lose
    // buffered log lines.
    let _log_guard = logging::init(config.log.directory.as_deref());

    let bind = config.server.bind.clone();
    let app_config = AppConfig::from_config_file(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    runtime.block_on(async move {
        let app = TrackerApp::start(app_config)
            .await
            .map_err(|e| CliError::App(e.to_string()))?;

        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .map_err(|e| CliError::Bind {
                addr: bind.clone(),
                message: e.to_string(),
            })?;
        info!(%bind, "GeoTrail listening");

        let router = http::router(app.service());
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Interrupt received; shutting down");
            })
            .await
            .map_err(|e| CliError::Serve(e.to_string()))?;

        app.shutdown().await;
        Ok(())
    })
}
