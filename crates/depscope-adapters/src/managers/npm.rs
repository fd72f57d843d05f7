//! npm: `npm query`
//!
//! Records from several selector queries are merged by install location.
//! Dependency names are resolved the way Node does it: look in the
//! requesting package's own `node_modules`, then walk up.

use crate::adapter::{PackageManagerAdapter, ResolveContext};
use crate::detect::ManagerKind;
use crate::error::{ResolveError, Result};
use crate::exec::command_line;
use crate::traverse::{Edge, PackageSource, walk};
use async_trait::async_trait;
use depscope_core::{DependencyKind, RawNode};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Selectors queried and merged.
const SELECTORS: &[&str] = &[":root", ".workspace", ".prod", ".dev", ".optional"];

const NODE_MODULES: &str = "node_modules";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NpmRecord {
    name: Option<String>,
    version: Option<String>,
    /// Install location relative to the root; `""` for the root itself.
    #[serde(default)]
    location: String,
    path: Option<PathBuf>,
    realpath: Option<PathBuf>,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, String>,
    /// npm 7+ installs peers; missing ones simply don't resolve.
    #[serde(default)]
    peer_dependencies: BTreeMap<String, String>,
}

pub struct NpmAdapter;

#[async_trait]
impl PackageManagerAdapter for NpmAdapter {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Npm
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<BTreeMap<String, RawNode>> {
        let mut records: BTreeMap<String, NpmRecord> = BTreeMap::new();
        let mut workspaces: BTreeSet<String> = BTreeSet::new();

        for selector in SELECTORS {
            let args = vec!["query".to_string(), selector.to_string()];
            let stdout = ctx.runner.run("npm", &args, ctx.root).await?;
            let batch: Vec<NpmRecord> = serde_json::from_str(&stdout)
                .map_err(|e| ResolveError::unparseable(command_line("npm", &args), e))?;
            tracing::debug!("npm query {} returned {} records", selector, batch.len());

            for record in batch {
                if matches!(*selector, ":root" | ".workspace") {
                    workspaces.insert(record.location.clone());
                }
                records.entry(record.location.clone()).or_insert(record);
            }
        }

        let source = NpmSource::new(ctx.root, records, workspaces, ctx.options.monorepo);
        Ok(walk(&source, ctx.options))
    }
}

struct NpmSource<'a> {
    root: &'a Path,
    records: BTreeMap<String, NpmRecord>,
    workspaces: BTreeSet<String>,
    /// Workspace location by real path, for link records.
    workspace_paths: BTreeMap<PathBuf, String>,
    monorepo: bool,
}

impl<'a> NpmSource<'a> {
    fn new(
        root: &'a Path,
        records: BTreeMap<String, NpmRecord>,
        workspaces: BTreeSet<String>,
        monorepo: bool,
    ) -> Self {
        let workspace_paths = workspaces
            .iter()
            .filter_map(|loc| {
                let record = records.get(loc)?;
                let path = record.realpath.clone().or_else(|| record.path.clone())?;
                Some((path, loc.clone()))
            })
            .collect();
        NpmSource {
            root,
            records,
            workspaces,
            workspace_paths,
            monorepo,
        }
    }

    /// Find the record `name` resolves to when required from `from`.
    fn resolve_dep(&self, from: &str, name: &str) -> Option<String> {
        let mut base = from.to_string();
        loop {
            let candidate = if base.is_empty() {
                format!("{NODE_MODULES}/{name}")
            } else {
                format!("{base}/{NODE_MODULES}/{name}")
            };
            if let Some(record) = self.records.get(&candidate) {
                return Some(self.follow_link(&candidate, record));
            }
            if base.is_empty() {
                return None;
            }
            base = parent_location(&base).to_string();
        }
    }

    /// Link records under `node_modules` point at a workspace folder.
    fn follow_link(&self, location: &str, record: &NpmRecord) -> String {
        record
            .realpath
            .as_ref()
            .filter(|real| Some(*real) != record.path.as_ref())
            .and_then(|real| self.workspace_paths.get(real))
            .cloned()
            .unwrap_or_else(|| location.to_string())
    }
}

/// `a/node_modules/b/node_modules/c` -> `a/node_modules/b`; top-level -> root.
fn parent_location(location: &str) -> &str {
    let marker = format!("/{NODE_MODULES}/");
    match location.rfind(&marker) {
        Some(idx) => &location[..idx],
        None => "",
    }
}

impl PackageSource for NpmSource<'_> {
    type Id = String;

    fn roots(&self) -> Vec<Self::Id> {
        if self.monorepo {
            self.workspaces.iter().cloned().collect()
        } else {
            vec![String::new()]
        }
    }

    fn node(&self, location: &Self::Id) -> Option<RawNode> {
        let record = self.records.get(location)?;
        let filepath = record
            .path
            .clone()
            .unwrap_or_else(|| self.root.join(location));
        let name = match &record.name {
            Some(name) => name.clone(),
            None => filepath.file_name()?.to_string_lossy().into_owned(),
        };
        let version = record.version.as_deref().unwrap_or("0.0.0");

        let mut node = RawNode::new(name, version, filepath);
        node.workspace = self.workspaces.contains(location);
        node.private = record.private;
        Some(node)
    }

    fn edges(&self, location: &Self::Id) -> Vec<Edge<Self::Id>> {
        let Some(record) = self.records.get(location) else {
            return Vec::new();
        };
        let mut fields = vec![
            (DependencyKind::Prod, &record.dependencies),
            (DependencyKind::Optional, &record.optional_dependencies),
            (DependencyKind::Prod, &record.peer_dependencies),
        ];
        if self.workspaces.contains(location) {
            fields.push((DependencyKind::Dev, &record.dev_dependencies));
        }

        let mut edges = Vec::new();
        for (kind, deps) in fields {
            for name in deps.keys() {
                match self.resolve_dep(location, name) {
                    Some(target) => edges.push(Edge::new(target, kind)),
                    None => tracing::trace!("{} not installed for {}", name, location),
                }
            }
        }
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_location() {
        assert_eq!(parent_location("node_modules/a"), "");
        assert_eq!(parent_location("node_modules/a/node_modules/b"), "node_modules/a");
        assert_eq!(parent_location("packages/ui/node_modules/@s/x"), "packages/ui");
    }

    fn record(location: &str, name: &str) -> NpmRecord {
        NpmRecord {
            name: Some(name.to_string()),
            version: Some("1.0.0".to_string()),
            location: location.to_string(),
            path: Some(PathBuf::from("/repo").join(location)),
            realpath: None,
            private: false,
            dependencies: BTreeMap::new(),
            dev_dependencies: BTreeMap::new(),
            optional_dependencies: BTreeMap::new(),
            peer_dependencies: BTreeMap::new(),
        }
    }

    #[test]
    fn test_resolution_prefers_nearest_node_modules() {
        let records: BTreeMap<String, NpmRecord> = [
            record("", "root"),
            record("node_modules/a", "a"),
            record("node_modules/b", "b"),
            record("node_modules/a/node_modules/b", "b"),
            record("node_modules/a/node_modules/c", "c"),
        ]
        .into_iter()
        .map(|r| (r.location.clone(), r))
        .collect();
        let source = NpmSource::new(Path::new("/repo"), records, BTreeSet::from([String::new()]), true);

        assert_eq!(source.resolve_dep("node_modules/a", "b").as_deref(), Some("node_modules/a/node_modules/b"));
        assert_eq!(source.resolve_dep("node_modules/a/node_modules/c", "b").as_deref(), Some("node_modules/a/node_modules/b"));
        assert_eq!(source.resolve_dep("node_modules/b", "a").as_deref(), Some("node_modules/a"));
        assert_eq!(source.resolve_dep("", "c"), None);
    }

    #[test]
    fn test_links_resolve_to_workspace_folder() {
        let mut ui = record("packages/ui", "ui");
        ui.realpath = Some(PathBuf::from("/repo/packages/ui"));
        let mut link = record("node_modules/ui", "ui");
        link.realpath = Some(PathBuf::from("/repo/packages/ui"));

        let records: BTreeMap<String, NpmRecord> = [record("", "root"), ui, link]
            .into_iter()
            .map(|r| (r.location.clone(), r))
            .collect();
        let workspaces = BTreeSet::from([String::new(), "packages/ui".to_string()]);
        let source = NpmSource::new(Path::new("/repo"), records, workspaces, true);

        assert_eq!(source.resolve_dep("", "ui").as_deref(), Some("packages/ui"));
    }

    #[test]
    fn test_installed_peers_are_followed() {
        let mut app = record("", "app");
        app.dependencies.insert("react-dom".to_string(), "^18.2.0".to_string());
        let mut react_dom = record("node_modules/react-dom", "react-dom");
        react_dom.peer_dependencies.insert("react".to_string(), "^18.2.0".to_string());
        react_dom.peer_dependencies.insert("react-native".to_string(), "*".to_string());

        let records: BTreeMap<String, NpmRecord> =
            [app, react_dom, record("node_modules/react", "react")]
                .into_iter()
                .map(|r| (r.location.clone(), r))
                .collect();
        let source = NpmSource::new(Path::new("/repo"), records, BTreeSet::from([String::new()]), true);
        let packages = walk(&source, &crate::adapter::ResolveOptions::new("/repo"));

        assert_eq!(
            packages.keys().collect::<Vec<_>>(),
            vec!["app@1.0.0", "react-dom@1.0.0", "react@1.0.0"]
        );
        assert!(packages["react-dom@1.0.0"].dependencies.contains("react@1.0.0"));
        assert!(packages["react@1.0.0"].clusters.contains(depscope_core::CLUSTER_PROD));
    }
}
