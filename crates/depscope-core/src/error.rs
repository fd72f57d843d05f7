//! Error types for depscope-core operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The error type for depscope-core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error while touching the filesystem.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `depscope.toml` could not be parsed.
    #[error("Invalid config: {0}")]
    Config(#[from] toml::de::Error),

    /// A filter pattern could not be compiled.
    #[error("Invalid filter pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// A specialized Result type for depscope-core operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
