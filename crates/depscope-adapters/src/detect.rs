//! Package manager detection
//!
//! Walks up from the working directory to the first directory holding a
//! lockfile. When one directory holds lockfiles for several managers, the
//! `packageManager` field of its `package.json` breaks the tie.

use crate::error::{ResolveError, Result};
use depscope_core::PackageManifest;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerKind {
    Pnpm,
    Npm,
    Yarn,
    Bun,
}

impl ManagerKind {
    /// Executable name.
    pub fn program(self) -> &'static str {
        match self {
            ManagerKind::Pnpm => "pnpm",
            ManagerKind::Npm => "npm",
            ManagerKind::Yarn => "yarn",
            ManagerKind::Bun => "bun",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "pnpm" => Some(ManagerKind::Pnpm),
            "npm" => Some(ManagerKind::Npm),
            "yarn" => Some(ManagerKind::Yarn),
            "bun" => Some(ManagerKind::Bun),
            _ => None,
        }
    }
}

impl fmt::Display for ManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// Lockfiles in lookup order.
const LOCKFILES: &[(&str, ManagerKind)] = &[
    ("pnpm-lock.yaml", ManagerKind::Pnpm),
    ("bun.lock", ManagerKind::Bun),
    ("bun.lockb", ManagerKind::Bun),
    ("yarn.lock", ManagerKind::Yarn),
    ("package-lock.json", ManagerKind::Npm),
    ("npm-shrinkwrap.json", ManagerKind::Npm),
];

/// The manager in charge of a project and the directory it was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub kind: ManagerKind,
    pub root: PathBuf,
}

/// Find the package manager for `cwd`.
pub fn detect_manager(cwd: &Path) -> Result<Detection> {
    for dir in cwd.ancestors() {
        let found: Vec<(&str, ManagerKind)> = LOCKFILES
            .iter()
            .copied()
            .filter(|(file, _)| dir.join(file).is_file())
            .collect();
        let Some(&(first_file, first_kind)) = found.first() else {
            continue;
        };

        let (lockfile, kind) = match declared_manager(dir)? {
            Some(declared) => found
                .iter()
                .copied()
                .find(|(_, kind)| *kind == declared)
                .unwrap_or((first_file, first_kind)),
            None => (first_file, first_kind),
        };

        check_supported(dir, lockfile, kind)?;
        tracing::debug!("Detected {} via {} in {}", kind, lockfile, dir.display());
        return Ok(Detection {
            kind,
            root: dir.to_path_buf(),
        });
    }

    Err(ResolveError::NoPackageManager(cwd.to_path_buf()))
}

/// Parse `packageManager` (`"pnpm@9.1.0+sha..."`) from the directory's manifest.
fn declared_manager(dir: &Path) -> Result<Option<ManagerKind>> {
    if !dir.join(depscope_core::manifest::MANIFEST_FILE).is_file() {
        return Ok(None);
    }
    let manifest = match PackageManifest::read(dir) {
        Ok(manifest) => manifest,
        Err(e) => {
            tracing::debug!("Ignoring unreadable manifest in {}: {}", dir.display(), e);
            return Ok(None);
        }
    };
    let Some(field) = manifest.package_manager else {
        return Ok(None);
    };
    let (name, version) = field.split_once('@').unwrap_or((field.as_str(), ""));
    match ManagerKind::from_name(name) {
        Some(ManagerKind::Yarn) if version.starts_with("1.") => Err(
            ResolveError::UnsupportedManager(format!("yarn classic ({field})")),
        ),
        Some(kind) => Ok(Some(kind)),
        None => Err(ResolveError::UnsupportedManager(field)),
    }
}

fn check_supported(dir: &Path, lockfile: &str, kind: ManagerKind) -> Result<()> {
    match (kind, lockfile) {
        (ManagerKind::Bun, "bun.lockb") if !dir.join("bun.lock").is_file() => Err(
            ResolveError::UnsupportedManager("bun binary lockfile (bun.lockb)".to_string()),
        ),
        (ManagerKind::Yarn, _) if !is_yarn_berry(dir) => Err(ResolveError::UnsupportedManager(
            "yarn classic".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Berry projects carry `.yarnrc.yml`, and their lockfile a `__metadata` block.
fn is_yarn_berry(dir: &Path) -> bool {
    if dir.join(".yarnrc.yml").is_file() {
        return true;
    }
    std::fs::read_to_string(dir.join("yarn.lock"))
        .map(|content| content.contains("__metadata:"))
        .unwrap_or(false)
}
