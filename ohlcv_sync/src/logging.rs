//! Tracing setup for the binary.
//!
//! Events go to stderr. With `logging.directory` set they are also appended to
//! `<directory>/<YYYY-MM-DD>/ohlcv_sync_<HHMMSS>.log`, one file per process.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::{DateTime, Utc};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("cannot create log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid log filter {directive:?}: {message}")]
    Filter { directive: String, message: String },

    #[error("a global subscriber is already installed")]
    AlreadyInstalled,
}

/// Path of the log file for a process started at `now`.
pub fn log_file_path(directory: &Path, now: DateTime<Utc>) -> PathBuf {
    directory
        .join(now.format("%Y-%m-%d").to_string())
        .join(format!("ohlcv_sync_{}.log", now.format("%H%M%S")))
}

fn open_log_file(directory: &Path, now: DateTime<Utc>) -> Result<(File, PathBuf), LoggingError> {
    let path = log_file_path(directory, now);
    let file = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| File::options().create(true).append(true).open(&path))
        .map_err(|source| LoggingError::File {
            path: path.clone(),
            source,
        })?;
    Ok((file, path))
}

fn filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| LoggingError::Filter {
        directive: config.level.clone(),
        message: e.to_string(),
    })
}

/// Installs the global subscriber. `RUST_LOG` overrides `config.level`.
///
/// Returns the log file path when file output is enabled.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<PathBuf>, LoggingError> {
    let filter = filter(config)?;

    let (file_layer, path) = match &config.directory {
        Some(dir) => {
            let (file, path) = open_log_file(dir, Utc::now())?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInstalled)?;

    Ok(path)
}
