//! Yarn berry: `yarn info --all --recursive --json`
//!
//! The output is newline-delimited JSON, one record per locator
//! (`name@npm:1.2.3`, `app@workspace:packages/app`). Yarn only knows which
//! manifest field declared an edge for workspaces, so their manifests are
//! read to split dev and optional edges from production ones.

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

/// Version yarn reports for workspaces that declare none.
const LOCAL_VERSION_SENTINEL: &str = "0.0.0-use.local";
const WORKSPACE_PROTOCOL: &str = "workspace:";
const VIRTUAL_PROTOCOL: &str = "virtual:";

#[derive(Debug, Deserialize)]
struct InfoLine {
    value: String,
    #[serde(default)]
    children: InfoChildren,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InfoChildren {
    version: Option<String>,
    #[serde(default)]
    dependencies: Vec<InfoDependency>,
}

#[derive(Debug, Deserialize)]
struct InfoDependency {
    /// Declared range; its name is the alias used in the manifest.
    descriptor: Option<String>,
    locator: String,
}

/// Split a locator at the first `@` that isn't a scope marker.
pub fn split_locator(locator: &str) -> Option<(&str, &str)> {
    let at = locator.get(1..)?.find('@')? + 1;
    Some((&locator[..at], &locator[at + 1..]))
}

/// `name@virtual:<hash>#npm:1.0.0` -> `name@npm:1.0.0`.
fn devirtualize(locator: &str) -> Option<String> {
    let (name, reference) = split_locator(locator)?;
    let inner = reference.strip_prefix(VIRTUAL_PROTOCOL)?;
    let (_, target) = inner.split_once('#')?;
    Some(format!("{name}@{target}"))
}

pub struct YarnAdapter;

#[async_trait]
impl PackageManagerAdapter for YarnAdapter {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Yarn
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<BTreeMap<String, RawNode>> {
        let args: Vec<String> = ["info", "--all", "--recursive", "--json"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let stdout = ctx.runner.run("yarn", &args, ctx.root).await?;

        let mut lines = BTreeMap::new();
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            let info: InfoLine = serde_json::from_str(line)
                .map_err(|e| ResolveError::unparseable(command_line("yarn", &args), e))?;
            lines.insert(info.value.clone(), info);
        }

        let source = YarnSource::new(ctx.root, lines, ctx.options.monorepo);
        Ok(walk(&source, ctx.options))
    }
}

struct YarnSource<'a> {
    root: &'a Path,
    lines: BTreeMap<String, InfoLine>,
    /// Workspace manifests keyed by locator.
    manifests: BTreeMap<String, PackageManifest>,
    monorepo: bool,
}

impl<'a> YarnSource<'a> {
    fn new(root: &'a Path, lines: BTreeMap<String, InfoLine>, monorepo: bool) -> Self {
        let manifests = lines
            .keys()
            .filter_map(|locator| {
                let dir = workspace_dir(root, locator)?;
                match PackageManifest::read(&dir) {
                    Ok(manifest) => Some((locator.clone(), manifest)),
                    Err(e) => {
                        tracing::debug!("No manifest for workspace {}: {}", locator, e);
                        None
                    }
                }
            })
            .collect();
        YarnSource {
            root,
            lines,
            manifests,
            monorepo,
        }
    }

    fn lookup(&self, locator: &str) -> Option<String> {
        if self.lines.contains_key(locator) {
            return Some(locator.to_string());
        }
        devirtualize(locator).filter(|l| self.lines.contains_key(l))
    }

    fn edge_kind(&self, from: &str, dependency: &str) -> DependencyKind {
        let Some(manifest) = self.manifests.get(from) else {
            return DependencyKind::Prod;
        };
        if manifest.dev_dependencies.contains_key(dependency) {
            DependencyKind::Dev
        } else if manifest.optional_dependencies.contains_key(dependency) {
            DependencyKind::Optional
        } else {
            DependencyKind::Prod
        }
    }
}

/// Directory of a `name@workspace:<path>` locator.
fn workspace_dir(root: &Path, locator: &str) -> Option<PathBuf> {
    let (_, reference) = split_locator(locator)?;
    let path = reference.strip_prefix(WORKSPACE_PROTOCOL)?;
    Some(if path == "." { root.to_path_buf() } else { root.join(path) })
}

impl PackageSource for YarnSource<'_> {
    type Id = String;

    fn roots(&self) -> Vec<Self::Id> {
        self.lines
            .keys()
            .filter(|locator| match workspace_dir(self.root, locator) {
                Some(dir) => self.monorepo || dir == self.root,
                None => false,
            })
            .cloned()
            .collect()
    }

    fn node(&self, locator: &Self::Id) -> Option<RawNode> {
        let line = self.lines.get(locator)?;
        let (name, _) = split_locator(locator)?;

        let Some(dir) = workspace_dir(self.root, locator) else {
            let version = line.children.version.as_deref()?;
            return Some(RawNode::new(
                name,
                version,
                self.root.join("node_modules").join(name),
            ));
        };

        let manifest = self.manifests.get(locator);
        let version = match line.children.version.as_deref() {
            Some(v) if v != LOCAL_VERSION_SENTINEL => v,
            _ => manifest
                .and_then(|m| m.version.as_deref())
                .unwrap_or("0.0.0"),
        };
        let mut node = RawNode::new(name, version, dir);
        node.workspace = true;
        node.private = manifest.is_some_and(|m| m.private);
        Some(node)
    }

    fn edges(&self, locator: &Self::Id) -> Vec<Edge<Self::Id>> {
        let Some(line) = self.lines.get(locator) else {
            return Vec::new();
        };
        line.children
            .dependencies
            .iter()
            .filter_map(|dep| {
                let target = self.lookup(&dep.locator)?;
                let declared = dep.descriptor.as_deref().unwrap_or(&dep.locator);
                let (name, _) = split_locator(declared)?;
                let kind = self.edge_kind(locator, name);
                Some(Edge::new(target, kind))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_locator() {
        assert_eq!(split_locator("react@npm:18.2.0"), Some(("react", "npm:18.2.0")));
        assert_eq!(
            split_locator("@babel/core@npm:7.23.0"),
            Some(("@babel/core", "npm:7.23.0"))
        );
        assert_eq!(split_locator("app@workspace:."), Some(("app", "workspace:.")));
        assert_eq!(split_locator("nope"), None);
    }

    #[test]
    fn test_devirtualize() {
        assert_eq!(
            devirtualize("@scope/x@virtual:abc123#npm:1.0.0").as_deref(),
            Some("@scope/x@npm:1.0.0")
        );
        assert_eq!(devirtualize("x@npm:1.0.0"), None);
    }

    #[test]
    fn test_workspace_dir() {
        let root = Path::new("/repo");
        assert_eq!(workspace_dir(root, "app@workspace:."), Some(PathBuf::from("/repo")));
        assert_eq!(
            workspace_dir(root, "ui@workspace:packages/ui"),
            Some(PathBuf::from("/repo/packages/ui"))
        );
        assert_eq!(workspace_dir(root, "ui@npm:1.0.0"), None);
    }
}
