//! Logging initialisation
//!
//! Human-readable output goes to stderr. When a log directory is given, the
//! same events are also written as JSON lines to `buildpack-cache.log` in that
//! directory. The filter comes from `BUILDPACK_CACHE_LOG` (`EnvFilter` syntax)
//! and otherwise from the verbosity level.

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LOG_FILTER_ENV;

pub const LOG_FILE: &str = "buildpack-cache.log";

/// Keeps the file writer alive; dropping it flushes pending log lines
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber
pub fn init(log_dir: Option<&Path>, verbosity: u8) -> io::Result<LoggingGuard> {
    let filter = env_filter(std::env::var(LOG_FILTER_ENV).ok().as_deref(), verbosity);

    let stderr_layer = fmt::layer().with_writer(io::stderr).with_target(false);

    let (file_layer, file_guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(io::Error::other)?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// The explicit directive if it parses, else the default for `verbosity`
fn env_filter(directive: Option<&str>, verbosity: u8) -> EnvFilter {
    directive
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive(verbosity)))
}

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "buildpack_cache=info",
        1 => "buildpack_cache=debug",
        _ => "buildpack_cache=trace",
    }
}
