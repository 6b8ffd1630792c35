#![allow(non_shorthand_field_patterns)]
#![doc = "Error handling primitives shared across the statistics collector."]
// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
//
// SPDX-License-Identifier: MIT

//! The derive emitted by [`masterror::Error`] expands pattern matches that
//! trigger the `non_shorthand_field_patterns` lint. The lint is disabled for
//! the module to keep the generated implementations warning-free.
//!
//! Remote failures are classified once, at the octocrab boundary, so the
//! retry policy can tell a quota rejection apart from every other failure
//! without inspecting messages.

use std::path::{Path, PathBuf};

/// Unified error type returned by the collector, the cache and the CLI.
#[derive(Debug, masterror::Error)]
pub enum Error {
    /// Wraps I/O errors that occur while reading configuration files.
    #[error("failed to read configuration from {path:?}: {source}")]
    Io {
        /// Location of the configuration file.
        path:   PathBuf,
        /// Underlying I/O error.
        source: std::io::Error
    },
    /// Wraps YAML decoding errors.
    #[error("failed to parse configuration: {source}")]
    Parse {
        /// Source decoding error from serde_yaml.
        source: serde_yaml::Error
    },
    /// Returned when the configuration violates invariants.
    #[error("invalid configuration: {message}")]
    Validation {
        /// Human readable message describing the validation problem.
        message: String
    },
    /// Returned when the account token or username cannot be used.
    #[error("invalid credentials: {message}")]
    Credentials {
        /// Human readable message describing the credential problem.
        message: String
    },
    /// Wraps JSON serialization and decoding errors.
    #[error("failed to process JSON: {source}")]
    Serialize {
        /// Underlying serialization error.
        source: serde_json::Error
    },
    /// Wraps I/O errors raised while preparing the cache directory.
    #[error("failed to prepare cache directory {path:?}: {source}")]
    CacheIo {
        /// Location of the cache directory.
        path:   PathBuf,
        /// Underlying I/O error reported by the operating system.
        source: std::io::Error
    },
    /// Wraps I/O errors raised while writing rendered output.
    #[error("failed to write output at {path:?}: {source}")]
    OutputIo {
        /// Location of the output file.
        path:   PathBuf,
        /// Underlying I/O error reported by the operating system.
        source: std::io::Error
    },
    /// The remote API could not be reached or returned an unreadable reply.
    #[error("transport error: {message}")]
    Transport {
        /// Human readable message describing the transport failure.
        message: String
    },
    /// The remote API answered with a non-success status.
    #[error("GitHub API returned {status}: {message}")]
    Api {
        /// HTTP status code reported by the API.
        status:  u16,
        /// Message extracted from the response.
        message: String
    },
    /// The remote API rejected the call because the quota is spent.
    #[error("GitHub API quota exceeded: {message}")]
    QuotaExceeded {
        /// Message extracted from the response.
        message: String
    },
    /// The retry policy ran out of attempts.
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Name of the operation that was retried.
        operation:  String,
        /// Number of invocations performed.
        attempts:   u32,
        /// Failure reported by the final invocation.
        last_error: Box<Error>
    }
}

impl Error {
    /// Constructs a validation error from the provided displayable value.
    ///
    /// # Parameters
    ///
    /// * `message` - Human-readable description of the validation failure.
    pub fn validation<M>(message: M) -> Self
    where
        M: Into<String>
    {
        Self::Validation {
            message: message.into()
        }
    }

    /// Constructs a credentials error from the provided displayable value.
    pub fn credentials<M>(message: M) -> Self
    where
        M: Into<String>
    {
        Self::Credentials {
            message: message.into()
        }
    }

    /// Constructs a transport error from the provided displayable value.
    pub fn transport<M>(message: M) -> Self
    where
        M: Into<String>
    {
        Self::Transport {
            message: message.into()
        }
    }

    /// Returns `true` when the remote API rejected the call for quota reasons.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }

    /// Returns the HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api {
                status, ..
            } => Some(*status),
            Self::RetriesExhausted {
                last_error, ..
            } => last_error.status(),
            _ => None
        }
    }

    /// Formats the error for diagnostics without the variant name.
    ///
    /// The returned string matches the [`std::fmt::Display`] implementation.
    pub fn to_display_string(&self) -> String {
        format!("{self}")
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(source: serde_yaml::Error) -> Self {
        Self::Parse {
            source
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::Serialize {
            source
        }
    }
}

impl From<octocrab::Error> for Error {
    fn from(error: octocrab::Error) -> Self {
        match &error {
            octocrab::Error::GitHub {
                source, ..
            } => classify_status(source.status_code.as_u16(), source.message.clone()),
            _ => Self::Transport {
                message: error.to_string()
            }
        }
    }
}

/// Maps an HTTP status reported by the API onto the error taxonomy.
///
/// 403 and 429 are the statuses GitHub uses for spent primary and secondary
/// quotas; every other status is a generic API failure.
pub fn classify_status(status: u16, message: String) -> Error {
    match status {
        403 | 429 => Error::QuotaExceeded {
            message
        },
        _ => Error::Api {
            status,
            message
        }
    }
}

/// Creates an [`Error::Io`] variant capturing the failing path and source.
///
/// # Parameters
///
/// * `path` - Location of the configuration file that triggered the error.
/// * `source` - I/O error reported by the operating system.
pub fn io_error(path: &Path, source: std::io::Error) -> Error {
    Error::Io {
        path: path.to_path_buf(),
        source
    }
}

/// Creates an [`Error::CacheIo`] variant capturing the failing path and source.
pub fn cache_io_error(path: &Path, source: std::io::Error) -> Error {
    Error::CacheIo {
        path: path.to_path_buf(),
        source
    }
}

/// Creates an [`Error::OutputIo`] variant capturing the failing path and source.
pub fn output_io_error(path: &Path, source: std::io::Error) -> Error {
    Error::OutputIo {
        path: path.to_path_buf(),
        source
    }
}
