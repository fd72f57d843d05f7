//! The adapter contract shared by every package manager

use crate::detect::ManagerKind;
use crate::error::Result;
use crate::exec::CommandRunner;
use async_trait::async_trait;
use depscope_core::RawNode;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Predicate over a node, used to prune traversal.
pub type NodeFilter = Arc<dyn Fn(&RawNode) -> bool + Send + Sync>;

/// Options accepted by every adapter.
#[derive(Clone)]
pub struct ResolveOptions {
    pub cwd: PathBuf,
    /// Maximum number of edges followed from a workspace root.
    pub depth: usize,
    /// Include all workspace packages instead of only the root one.
    pub monorepo: bool,
    /// Nodes failing this are recorded but never expanded.
    pub traverse_filter: Option<NodeFilter>,
    /// Nodes failing this are recorded but their dependency edges are not
    /// followed.
    pub dependencies_filter: Option<NodeFilter>,
}

impl ResolveOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        ResolveOptions {
            cwd: cwd.into(),
            depth: 25,
            monorepo: true,
            traverse_filter: None,
            dependencies_filter: None,
        }
    }

    pub fn from_config(cwd: impl Into<PathBuf>, config: &depscope_core::Config) -> Self {
        ResolveOptions {
            depth: config.depth,
            monorepo: config.monorepo,
            ..ResolveOptions::new(cwd)
        }
    }

    pub(crate) fn should_traverse(&self, node: &RawNode) -> bool {
        self.traverse_filter.as_ref().is_none_or(|f| f(node))
    }

    pub(crate) fn should_expand(&self, node: &RawNode) -> bool {
        self.dependencies_filter.as_ref().is_none_or(|f| f(node))
    }
}

impl fmt::Debug for ResolveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveOptions")
            .field("cwd", &self.cwd)
            .field("depth", &self.depth)
            .field("monorepo", &self.monorepo)
            .field("traverse_filter", &self.traverse_filter.is_some())
            .field("dependencies_filter", &self.dependencies_filter.is_some())
            .finish()
    }
}

/// Everything an adapter needs for one resolution.
pub struct ResolveContext<'a> {
    /// Directory holding the lockfile.
    pub root: &'a Path,
    pub options: &'a ResolveOptions,
    pub runner: &'a dyn CommandRunner,
}

/// Result of listing a project's dependencies.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult {
    pub root: PathBuf,
    pub package_manager: ManagerKind,
    pub package_manager_version: Option<String>,
    pub packages: BTreeMap<String, RawNode>,
}

/// Turns one package manager's view of a project into raw nodes keyed by
/// spec.
#[async_trait]
pub trait PackageManagerAdapter: Send + Sync {
    fn kind(&self) -> ManagerKind;

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<BTreeMap<String, RawNode>>;

    /// Best-effort `<manager> --version`.
    async fn version(&self, root: &Path, runner: &dyn CommandRunner) -> Option<String> {
        let program = self.kind().program();
        match runner.run(program, &["--version".to_string()], root).await {
            Ok(out) => Some(out.trim().to_string()).filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::debug!("Could not read {} version: {}", program, e);
                None
            }
        }
    }
}
