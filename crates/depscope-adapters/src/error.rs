//! Error types for dependency resolution.
//!
//! Every variant is fatal: resolution stops and no partial graph is returned.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// The package manager executable could not be spawned.
    #[error("`{program}` was not found on PATH")]
    ManagerNotFound { program: String },

    /// The package manager ran but exited unsuccessfully.
    #[error("`{command}` exited with {status}: {stderr}")]
    ManagerFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// Output did not have the shape the adapter expects.
    #[error("Could not parse output of `{command}`: {reason}")]
    UnparseableOutput { command: String, reason: String },

    /// No lockfile in the working directory or any ancestor.
    #[error("No package manager lockfile found in {} or any parent directory", .0.display())]
    NoPackageManager(PathBuf),

    #[error("Unsupported package manager: {0}")]
    UnsupportedManager(String),

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ResolveError>;

impl ResolveError {
    pub(crate) fn unparseable(command: impl Into<String>, reason: impl ToString) -> Self {
        ResolveError::UnparseableOutput {
            command: command.into(),
            reason: reason.to_string(),
        }
    }
}
