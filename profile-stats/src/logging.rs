// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Subscriber setup for the binary.
//!
//! Events go to stderr and, unless `logging.directory` is empty, to a
//! plain-text file inside that directory. The subscriber is installed once
//! per process.

use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::Mutex
};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    config::LoggingSettings,
    error::{self, Error}
};

/// Name of the log file created inside `logging.directory`.
pub const LOG_FILE_NAME: &str = "profile-stats.log";

/// Filter directive applied when none is forced.
///
/// `--verbose` wins over `RUST_LOG`, which wins over `logging.level`.
pub fn filter_directive(
    settings: &LoggingSettings,
    verbose: bool,
    rust_log: Option<String>
) -> String {
    if verbose {
        return "debug".to_owned();
    }
    rust_log
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| settings.level.to_lowercase())
}

/// Location of the log file, or `None` when file logging is disabled.
pub fn log_file_path(settings: &LoggingSettings) -> Option<PathBuf> {
    let directory = settings.directory.trim();
    if directory.is_empty() {
        return None;
    }
    Some(PathBuf::from(directory).join(LOG_FILE_NAME))
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns [`Error::OutputIo`] when the log directory or file cannot be
/// created.
pub fn init_logging(settings: &LoggingSettings, verbose: bool) -> Result<(), Error> {
    let directive = filter_directive(settings, verbose, std::env::var("RUST_LOG").ok());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file_path(settings) {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|source| error::output_io_error(parent, source))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|source| error::output_io_error(&path, source))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None
    };

    // A second installation in the same process keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();

    Ok(())
}
