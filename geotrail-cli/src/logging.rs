//! Tracing bootstrap.
//!
//! Logs go to stderr with local-time formatting; when a log directory is
//! configured, a daily-rolling file takes over and stderr stays quiet of
//! per-request noise. The filter honors `RUST_LOG` and defaults to `info`.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// The returned guard must stay alive for the process lifetime when file
/// logging is active, or buffered lines are lost on exit.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let timer = LocalTime::rfc_3339();

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "geotrail.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_timer(timer)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_timer(timer)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}
