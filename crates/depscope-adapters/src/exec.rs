//! Running package-manager commands
//!
//! Adapters never spawn processes directly; they go through a
//! [`CommandRunner`] so tests can replay captured output.

use crate::error::{ResolveError, Result};
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program args...` in `cwd` and return its stdout.
    async fn run(&self, program: &str, args: &[String], cwd: &Path) -> Result<String>;
}

/// Render a command line for logs and error messages.
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String], cwd: &Path) -> Result<String> {
        let command = command_line(program, args);
        tracing::debug!("Running `{}` in {}", command, cwd.display());

        let output = tokio::process::Command::new(program)
            .args(args)
            .current_dir(cwd)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ResolveError::ManagerNotFound {
                    program: program.to_string(),
                },
                _ => ResolveError::Io {
                    path: cwd.to_path_buf(),
                    source: e,
                },
            })?;

        if !output.status.success() {
            return Err(ResolveError::ManagerFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use fixture::FixtureRunner;

#[cfg(any(test, feature = "test-util"))]
mod fixture {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Replays canned stdout keyed by the full command line.
    ///
    /// Unknown commands fail with [`ResolveError::ManagerNotFound`], which is
    /// what a machine without the manager installed would report.
    #[derive(Debug, Default)]
    pub struct FixtureRunner {
        outputs: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    impl FixtureRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, command: &str, stdout: impl Into<String>) -> Self {
            self.outputs.insert(command.to_string(), stdout.into());
            self
        }

        /// Command lines seen so far, in call order.
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl CommandRunner for FixtureRunner {
        async fn run(&self, program: &str, args: &[String], _cwd: &Path) -> Result<String> {
            let command = command_line(program, args);
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(command.clone());
            }
            self.outputs
                .get(&command)
                .cloned()
                .ok_or_else(|| ResolveError::ManagerNotFound {
                    program: program.to_string(),
                })
        }
    }
}
