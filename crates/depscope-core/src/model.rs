//! Core data structures for the dependency graph

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Cluster label for packages reached through a `dependencies` edge.
pub const CLUSTER_PROD: &str = "dep:prod";
/// Cluster label for packages reached through a `devDependencies` edge.
pub const CLUSTER_DEV: &str = "dep:dev";
/// Cluster label for packages reached through an `optionalDependencies` edge.
pub const CLUSTER_OPTIONAL: &str = "dep:optional";

/// Build the canonical `name@version` identity of a package.
pub fn make_spec(name: &str, version: &str) -> String {
    format!("{name}@{version}")
}

/// Split a spec back into `(name, version)`. Scoped names keep their leading `@`.
pub fn split_spec(spec: &str) -> Option<(&str, &str)> {
    let start = usize::from(spec.starts_with('@'));
    let at = spec[start..].find('@')? + start;
    Some((&spec[..at], &spec[at + 1..]))
}

/// Which manifest field an edge was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Prod,
    Dev,
    Optional,
}

impl DependencyKind {
    /// The cluster label attached to nodes reached through this kind of edge.
    pub fn cluster(self) -> &'static str {
        match self {
            DependencyKind::Prod => CLUSTER_PROD,
            DependencyKind::Dev => CLUSTER_DEV,
            DependencyKind::Optional => CLUSTER_OPTIONAL,
        }
    }
}

/// A package as emitted by a package-manager adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNode {
    pub name: String,
    pub version: String,
    /// `name@version`, unique across the graph.
    pub spec: String,
    /// Install location on disk (may not exist for lockfile-only adapters).
    pub filepath: PathBuf,
    /// Specs of direct dependencies.
    pub dependencies: BTreeSet<String>,
    /// Belongs to the local monorepo under inspection.
    pub workspace: bool,
    pub private: bool,
    /// Labels attached while traversing edges into this node.
    pub clusters: BTreeSet<String>,
}

impl RawNode {
    pub fn new(name: impl Into<String>, version: impl Into<String>, filepath: PathBuf) -> Self {
        let name = name.into();
        let version = version.into();
        RawNode {
            spec: make_spec(&name, &version),
            name,
            version,
            filepath,
            dependencies: BTreeSet::new(),
            workspace: false,
            private: false,
            clusters: BTreeSet::new(),
        }
    }
}

/// A node with reverse edges and transitive closures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseNode {
    #[serde(flatten)]
    pub raw: RawNode,
    /// Specs of packages that directly depend on this one.
    pub dependents: BTreeSet<String>,
    /// Shortest edge count from any workspace node. `None` if unreachable.
    pub depth: Option<u32>,
    pub flat_dependencies: BTreeSet<String>,
    pub flat_dependents: BTreeSet<String>,
    /// Union of the clusters contributed by every path reaching this node.
    pub flat_clusters: BTreeSet<String>,
    /// Reachable through a production edge.
    pub prod: bool,
    /// Reachable through a dev edge.
    pub dev: bool,
    /// Reachable through an optional edge.
    pub optional: bool,
}

impl BaseNode {
    pub fn spec(&self) -> &str {
        &self.raw.spec
    }

    pub fn name(&self) -> &str {
        &self.raw.name
    }

    pub fn version(&self) -> &str {
        &self.raw.version
    }

    pub fn is_workspace(&self) -> bool {
        self.raw.workspace
    }
}

impl From<RawNode> for BaseNode {
    fn from(raw: RawNode) -> Self {
        let depth = raw.workspace.then_some(0);
        let flat_clusters = raw.clusters.clone();
        BaseNode {
            raw,
            dependents: BTreeSet::new(),
            depth,
            flat_dependencies: BTreeSet::new(),
            flat_dependents: BTreeSet::new(),
            flat_clusters,
            prod: false,
            dev: false,
            optional: false,
        }
    }
}

/// How a package exposes its modules to Node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    Cjs,
    Esm,
    /// Ships both ESM and CJS entry points.
    Dual,
    /// Has a legacy `module` field for bundlers, but the runtime entry is CJS.
    Faux,
    /// Type declarations only.
    Dts,
}

/// Byte and file totals for one file category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeBucket {
    pub bytes: u64,
    pub files: u64,
}

/// Aggregated on-disk footprint of an installed package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallSize {
    pub bytes: u64,
    pub files: u64,
    pub categories: BTreeMap<String, SizeBucket>,
}

/// Registry metadata for one exact version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpmMeta {
    /// RFC 3339 publish time of this version.
    pub published_at: Option<String>,
    pub deprecated: Option<String>,
    pub integrity: Option<String>,
}

/// Registry metadata about the newest published version of a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpmMetaLatest {
    pub version: String,
    pub published_at: Option<String>,
    /// RFC 3339 time this entry was fetched.
    pub fetched_at: String,
    /// RFC 3339 time after which the entry must be refetched.
    pub valid_until: String,
}

/// A security advisory affecting a specific version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advisory {
    pub id: u64,
    pub title: String,
    pub severity: String,
    pub url: String,
    pub vulnerable_versions: String,
}

/// Severity of a lint message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LintLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintMessage {
    pub code: String,
    pub level: LintLevel,
    pub message: String,
}

/// A base node plus everything derived from its manifest and the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedNode {
    #[serde(flatten)]
    pub base: BaseNode,
    pub module: ModuleType,
    pub license: Option<String>,
    pub author: Option<String>,
    pub repository: Option<String>,
    pub fundings: Vec<String>,
    pub exports: Option<serde_json::Value>,
    pub engines: BTreeMap<String, String>,
    pub install_size: Option<InstallSize>,
    pub npm_meta: Option<NpmMeta>,
    pub npm_meta_latest: Option<NpmMetaLatest>,
    pub vulnerabilities: Vec<Advisory>,
    pub lints: Vec<LintMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_spec_handles_scopes() {
        assert_eq!(split_spec("vite@5.0.0"), Some(("vite", "5.0.0")));
        assert_eq!(split_spec("@types/node@20.1.0"), Some(("@types/node", "20.1.0")));
        assert_eq!(split_spec("no-version"), None);
    }

    #[test]
    fn test_workspace_base_node_starts_at_depth_zero() {
        let mut raw = RawNode::new("app", "1.0.0", PathBuf::from("/repo"));
        raw.workspace = true;
        let base = BaseNode::from(raw);
        assert_eq!(base.depth, Some(0));

        let dep = BaseNode::from(RawNode::new("dep", "1.0.0", PathBuf::from("/repo/node_modules/dep")));
        assert_eq!(dep.depth, None);
    }
}
