//! Tracing subscriber setup.
//!
//! Human-readable or JSON output on stderr, filtered by `SCENECAST_LOG`,
//! plus an optional non-blocking file layer inside the run directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

pub const LOG_ENV_VAR: &str = "SCENECAST_LOG";
pub const LOG_FILE_NAME: &str = "scenecast.log";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub verbose: bool,
    pub format: LogFormat,
    /// Directory for the log file; no file is written when unset
    pub log_dir: Option<PathBuf>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber.
///
/// The returned guard flushes the file layer when dropped and must be kept
/// alive until the process exits.
pub fn init_logging(options: &LogOptions) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(options.verbose)));

    let mut layers: Vec<BoxedLayer> = vec![stderr_layer(options.format)];

    let guard = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

fn stderr_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
    }
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

/// Where the file layer writes inside `log_dir`.
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    log_dir.join(LOG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "info");
        assert_eq!(default_directive(true), "debug");
    }

    #[test]
    fn test_log_file_path() {
        assert_eq!(
            log_file_path(Path::new("/runs/2026-03-14-noir/logs")),
            PathBuf::from("/runs/2026-03-14-noir/logs/scenecast.log")
        );
    }

    #[test]
    fn test_log_format_default_is_text() {
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }
}
