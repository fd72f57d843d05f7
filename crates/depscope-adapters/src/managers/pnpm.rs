//! pnpm: `pnpm ls --json`
//!
//! pnpm prints one record per workspace project, each with a nested
//! dependency tree. Workspace dependencies appear as `link:` versions and
//! are resolved back to the project they point at.

use crate::adapter::{PackageManagerAdapter, ResolveContext};
use crate::detect::ManagerKind;
use crate::error::{ResolveError, Result};
use crate::exec::command_line;
use crate::traverse::{Edge, PackageSource, walk};
use async_trait::async_trait;
use depscope_core::{DependencyKind, PackageManifest, RawNode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const WORKSPACE_FILE: &str = "pnpm-workspace.yaml";

const LINK_PREFIX: &str = "link:";
const CATALOG_PREFIX: &str = "catalog:";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PnpmProject {
    name: Option<String>,
    version: Option<String>,
    path: PathBuf,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    dependencies: BTreeMap<String, PnpmDep>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, PnpmDep>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, PnpmDep>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PnpmDep {
    /// Real package name when the key is an alias.
    from: Option<String>,
    version: String,
    path: Option<PathBuf>,
    #[serde(default)]
    dependencies: BTreeMap<String, PnpmDep>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, PnpmDep>,
}

/// Named catalogs from `pnpm-workspace.yaml`.
#[derive(Debug, Default, Deserialize)]
struct WorkspaceFile {
    #[serde(default)]
    catalog: BTreeMap<String, String>,
    #[serde(default)]
    catalogs: BTreeMap<String, BTreeMap<String, String>>,
}

impl WorkspaceFile {
    fn load(root: &Path) -> Self {
        let path = root.join(WORKSPACE_FILE);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return WorkspaceFile::default();
        };
        serde_yaml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unparseable {}: {}", path.display(), e);
            WorkspaceFile::default()
        })
    }

    /// Cluster label for a dependency declared as `catalog:` or
    /// `catalog:<name>`, if that catalog defines it.
    fn cluster_for(&self, package: &str, declared: &str) -> Option<String> {
        let catalog = declared.strip_prefix(CATALOG_PREFIX)?;
        let catalog = if catalog.is_empty() { "default" } else { catalog };
        let entries = match catalog {
            "default" if !self.catalog.is_empty() => Some(&self.catalog),
            name => self.catalogs.get(name),
        }?;
        entries
            .contains_key(package)
            .then(|| format!("{CATALOG_PREFIX}{catalog}"))
    }
}

pub struct PnpmAdapter;

#[async_trait]
impl PackageManagerAdapter for PnpmAdapter {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Pnpm
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<BTreeMap<String, RawNode>> {
        let mut args: Vec<String> = vec![
            "ls".into(),
            "--json".into(),
            "--depth".into(),
            // pnpm counts direct dependencies as depth 0.
            ctx.options.depth.saturating_sub(1).to_string(),
        ];
        if ctx.options.monorepo {
            args.push("--recursive".into());
        }

        let stdout = ctx.runner.run("pnpm", &args, ctx.root).await?;
        let projects: Vec<PnpmProject> = serde_json::from_str(&stdout)
            .map_err(|e| ResolveError::unparseable(command_line("pnpm", &args), e))?;

        let source = PnpmSource::new(ctx.root, &projects);
        Ok(walk(&source, ctx.options))
    }
}

#[derive(Clone, Copy)]
enum PnpmRef<'a> {
    Project(&'a PnpmProject),
    Dep(&'a str, &'a PnpmDep),
}

struct PnpmSource<'a> {
    root: &'a Path,
    projects: &'a [PnpmProject],
    workspace_file: WorkspaceFile,
}

impl<'a> PnpmSource<'a> {
    fn new(root: &'a Path, projects: &'a [PnpmProject]) -> Self {
        PnpmSource {
            root,
            projects,
            workspace_file: WorkspaceFile::load(root),
        }
    }

    /// The project a `link:` dependency points at.
    fn linked_project(&self, alias: &str, dep: &PnpmDep) -> Option<&'a PnpmProject> {
        if !dep.version.starts_with(LINK_PREFIX) {
            return None;
        }
        let name = dep.from.as_deref().unwrap_or(alias);
        self.projects
            .iter()
            .find(|p| dep.path.as_ref() == Some(&p.path))
            .or_else(|| self.projects.iter().find(|p| p.name.as_deref() == Some(name)))
    }

    fn project_node(&self, project: &PnpmProject) -> RawNode {
        let name = project.name.clone().unwrap_or_else(|| dir_name(&project.path));
        let version = project.version.as_deref().unwrap_or("0.0.0");
        let mut node = RawNode::new(name, version, project.path.clone());
        node.workspace = true;
        node.private = project.private;
        node
    }

    fn project_edges(&self, project: &'a PnpmProject) -> Vec<Edge<PnpmRef<'a>>> {
        let manifest = PackageManifest::read(&project.path).ok();
        let declared = |kind: DependencyKind, alias: &str| {
            let manifest = manifest.as_ref()?;
            let fields = match kind {
                DependencyKind::Prod => &manifest.dependencies,
                DependencyKind::Dev => &manifest.dev_dependencies,
                DependencyKind::Optional => &manifest.optional_dependencies,
            };
            fields.get(alias).cloned()
        };

        let mut edges = Vec::new();
        for (kind, deps) in [
            (DependencyKind::Prod, &project.dependencies),
            (DependencyKind::Dev, &project.dev_dependencies),
            (DependencyKind::Optional, &project.optional_dependencies),
        ] {
            for (alias, dep) in deps {
                let mut edge = Edge::new(PnpmRef::Dep(alias, dep), kind);
                if let Some(cluster) = declared(kind, alias)
                    .and_then(|d| self.workspace_file.cluster_for(alias, &d))
                {
                    edge.clusters.push(cluster);
                }
                edges.push(edge);
            }
        }
        edges
    }
}

impl<'a> PackageSource for PnpmSource<'a> {
    type Id = PnpmRef<'a>;

    fn roots(&self) -> Vec<Self::Id> {
        self.projects.iter().map(PnpmRef::Project).collect()
    }

    fn node(&self, id: &Self::Id) -> Option<RawNode> {
        let (alias, dep) = match *id {
            PnpmRef::Project(project) => return Some(self.project_node(project)),
            PnpmRef::Dep(alias, dep) => (alias, dep),
        };
        if let Some(project) = self.linked_project(alias, dep) {
            return Some(self.project_node(project));
        }

        let name = dep.from.as_deref().unwrap_or(alias);
        let filepath = dep
            .path
            .clone()
            .unwrap_or_else(|| self.root.join("node_modules").join(name));

        if dep.version.starts_with(LINK_PREFIX) {
            // Linked package outside the listed projects.
            let manifest = PackageManifest::read(&filepath).ok();
            let version = manifest.as_ref().and_then(|m| m.version.as_deref()).unwrap_or("0.0.0");
            let mut node = RawNode::new(name, version, filepath);
            node.workspace = true;
            node.private = manifest.is_some_and(|m| m.private);
            return Some(node);
        }

        Some(RawNode::new(name, dep.version.as_str(), filepath))
    }

    fn edges(&self, id: &Self::Id) -> Vec<Edge<Self::Id>> {
        let (alias, dep) = match *id {
            PnpmRef::Project(project) => return self.project_edges(project),
            PnpmRef::Dep(alias, dep) => (alias, dep),
        };
        if let Some(project) = self.linked_project(alias, dep) {
            return self.project_edges(project);
        }

        let prod = dep
            .dependencies
            .iter()
            .map(|(a, d)| Edge::new(PnpmRef::Dep(a, d), DependencyKind::Prod));
        let optional = dep
            .optional_dependencies
            .iter()
            .map(|(a, d)| Edge::new(PnpmRef::Dep(a, d), DependencyKind::Optional));
        prod.chain(optional).collect()
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_clusters() {
        let file: WorkspaceFile = serde_yaml::from_str(
            "packages:\n  - packages/*\ncatalog:\n  vue: ^3.4.0\ncatalogs:\n  legacy:\n    react: ^17.0.0\n",
        )
        .unwrap();
        assert_eq!(file.cluster_for("vue", "catalog:").as_deref(), Some("catalog:default"));
        assert_eq!(file.cluster_for("vue", "catalog:default").as_deref(), Some("catalog:default"));
        assert_eq!(file.cluster_for("react", "catalog:legacy").as_deref(), Some("catalog:legacy"));
        assert_eq!(file.cluster_for("react", "catalog:"), None);
        assert_eq!(file.cluster_for("vue", "^3.4.0"), None);
    }

    #[test]
    fn test_dep_records_tolerate_missing_fields() {
        let dep: PnpmDep = serde_json::from_str(r#"{"version": "1.0.0"}"#).unwrap();
        assert!(dep.from.is_none() && dep.dependencies.is_empty());
    }
}
