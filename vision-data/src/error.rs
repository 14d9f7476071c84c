//! Error types of the crate.

use std::{fmt::Display, path::PathBuf};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid options or an unusable dataset layout.
    #[error("{0}")]
    Configuration(String),
    /// A manifest or data file exists but cannot be understood.
    #[error("malformed file '{}': {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
    #[error("unable to access '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The storage client failed to return bytes for a sample.
    #[error("failed to fetch '{location}': {source}")]
    Fetch {
        location: String,
        #[source]
        source: anyhow::Error,
    },
    /// The fetched bytes are not a readable image.
    #[error("failed to decode '{location}': {source}")]
    Decode {
        location: String,
        #[source]
        source: image::ImageError,
    },
    #[error("label '{label}' is not found in the class map")]
    UnknownLabel { label: String },
    #[error("index {index} is out of range for {len} records")]
    IndexOutOfRange { index: usize, len: usize },
}

impl Error {
    /// Returns true for per-sample failures that a parser skips over.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Decode { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Display) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
