//! bun: reads the text lockfile `bun.lock` directly
//!
//! `bun.lock` is JSON with trailing commas. Packages are keyed by their
//! install path with `node_modules` segments dropped (`a/b` is `b` installed
//! under `a`), so edges are resolved with a best-effort lookup over those
//! keys; see [`resolve_bun_key`].

use crate::adapter::{PackageManagerAdapter, ResolveContext};
use crate::detect::ManagerKind;
use crate::error::{ResolveError, Result};
use crate::traverse::{Edge, PackageSource, walk};
use async_trait::async_trait;
use depscope_core::{DependencyKind, PackageManifest, RawNode, split_spec};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};

pub const LOCKFILE: &str = "bun.lock";

const WORKSPACE_PROTOCOL: &str = "workspace:";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BunLockfile {
    #[serde(default)]
    pub lockfile_version: u32,
    /// Keyed by path relative to the root; `""` is the root package.
    #[serde(default)]
    pub workspaces: BTreeMap<String, BunWorkspace>,
    /// `key -> [ident, registry, info, integrity]`; workspace entries only
    /// carry the ident.
    #[serde(default)]
    pub packages: BTreeMap<String, Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BunWorkspace {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub optional_dependencies: BTreeMap<String, String>,
}

/// Parse the contents of a `bun.lock`.
pub fn parse_bun_lock(content: &str) -> serde_json::Result<BunLockfile> {
    serde_json::from_str(&strip_trailing_commas(content))
}

/// Drop commas that directly precede `}` or `]`, leaving string contents alone.
fn strip_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in input.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
        } else if c == '"' {
            in_string = true;
        } else if c == ',' && input[i + 1..].trim_start().starts_with(['}', ']']) {
            continue;
        }
        out.push(c);
    }
    out
}

/// Split a package key into install segments, keeping scoped names whole:
/// `a/@s/b/c` -> `["a", "@s/b", "c"]`.
fn key_segments(key: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut rest = key;
    while !rest.is_empty() {
        let end = if rest.starts_with('@') {
            rest.find('/')
                .and_then(|slash| rest[slash + 1..].find('/').map(|i| slash + 1 + i))
        } else {
            rest.find('/')
        };
        match end {
            Some(end) => {
                segments.push(&rest[..end]);
                rest = &rest[end + 1..];
            }
            None => {
                segments.push(rest);
                break;
            }
        }
    }
    segments
}

fn last_segment(key: &str) -> &str {
    key_segments(key).last().copied().unwrap_or(key)
}

/// Find the package key `name` resolves to when required from `parent`.
///
/// Checked in order: the exact child key `parent/name`, any key nested deeper
/// under `parent` ending in `name`, the top-level key `name`, and finally the
/// first key (in sorted order) whose last segment is `name`. This is a
/// heuristic: when several installed copies could match, the first hit wins
/// even where Node would pick a different one.
pub fn resolve_bun_key<V>(
    packages: &BTreeMap<String, V>,
    parent: Option<&str>,
    name: &str,
) -> Option<String> {
    if let Some(parent) = parent {
        let child = format!("{parent}/{name}");
        if packages.contains_key(&child) {
            return Some(child);
        }

        let prefix = format!("{parent}/");
        let nested = packages
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(&prefix))
            .find(|key| last_segment(key) == name);
        if let Some(key) = nested {
            return Some(key.clone());
        }
    }

    if packages.contains_key(name) {
        return Some(name.to_string());
    }
    packages.keys().find(|key| last_segment(key) == name).cloned()
}

pub struct BunAdapter;

#[async_trait]
impl PackageManagerAdapter for BunAdapter {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Bun
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<BTreeMap<String, RawNode>> {
        let path = ctx.root.join(LOCKFILE);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ResolveError::Io {
                path: path.clone(),
                source,
            })?;
        let lockfile =
            parse_bun_lock(&content).map_err(|e| ResolveError::unparseable(LOCKFILE, e))?;
        tracing::debug!(
            "bun.lock v{}: {} workspaces, {} packages",
            lockfile.lockfile_version,
            lockfile.workspaces.len(),
            lockfile.packages.len()
        );

        let source = BunSource {
            root: ctx.root,
            lockfile: &lockfile,
            monorepo: ctx.options.monorepo,
        };
        Ok(walk(&source, ctx.options))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BunId {
    /// Path of a workspace relative to the root.
    Workspace(String),
    /// Key into `packages`.
    Package(String),
}

struct BunSource<'a> {
    root: &'a Path,
    lockfile: &'a BunLockfile,
    monorepo: bool,
}

impl BunSource<'_> {
    fn ident(&self, key: &str) -> Option<(&str, &str)> {
        let entry = self.lockfile.packages.get(key)?;
        split_spec(entry.first()?.as_str()?)
    }

    /// Workspace entries in `packages` point back at their folder.
    fn id_for_key(&self, key: String) -> BunId {
        match self.ident(&key) {
            Some((_, version)) if version.starts_with(WORKSPACE_PROTOCOL) => {
                BunId::Workspace(version[WORKSPACE_PROTOCOL.len()..].to_string())
            }
            _ => BunId::Package(key),
        }
    }

    fn workspace_dir(&self, path: &str) -> PathBuf {
        if path.is_empty() || path == "." {
            self.root.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn workspace_node(&self, path: &str) -> Option<RawNode> {
        let dir = self.workspace_dir(path);
        let manifest = PackageManifest::read(&dir).ok();
        let workspace = self.lockfile.workspaces.get(path);

        let name = workspace
            .and_then(|w| w.name.clone())
            .or_else(|| manifest.as_ref().and_then(|m| m.name.clone()))
            .or_else(|| dir.file_name().map(|n| n.to_string_lossy().into_owned()))?;
        let version = workspace
            .and_then(|w| w.version.clone())
            .or_else(|| manifest.as_ref().and_then(|m| m.version.clone()))
            .unwrap_or_else(|| "0.0.0".to_string());

        let mut node = RawNode::new(name, version, dir);
        node.workspace = true;
        node.private = manifest.is_some_and(|m| m.private);
        Some(node)
    }

    /// Keys nested under a workspace name live in that workspace's own
    /// `node_modules`, not under the root.
    fn package_dir(&self, key: &str) -> PathBuf {
        let segments = key_segments(key);
        let (mut dir, rest) = match segments.split_first() {
            Some((first, rest)) if !rest.is_empty() => match self.workspace_path(first) {
                Some(path) => (self.workspace_dir(path), rest),
                None => (self.root.to_path_buf(), segments.as_slice()),
            },
            _ => (self.root.to_path_buf(), segments.as_slice()),
        };
        for segment in rest {
            dir.push("node_modules");
            dir.push(segment);
        }
        dir
    }

    fn workspace_path(&self, name: &str) -> Option<&str> {
        self.lockfile
            .workspaces
            .iter()
            .find(|(path, w)| !matches!(path.as_str(), "" | ".") && w.name.as_deref() == Some(name))
            .map(|(path, _)| path.as_str())
    }

    fn edges_from<'n>(
        &self,
        parent: Option<&str>,
        fields: impl IntoIterator<Item = (DependencyKind, Vec<&'n str>)>,
    ) -> Vec<Edge<BunId>> {
        let mut edges = Vec::new();
        for (kind, names) in fields {
            for name in names {
                match resolve_bun_key(&self.lockfile.packages, parent, name) {
                    Some(key) => edges.push(Edge::new(self.id_for_key(key), kind)),
                    None => tracing::trace!("{} has no entry in bun.lock", name),
                }
            }
        }
        edges
    }
}

fn dep_names(deps: &BTreeMap<String, String>) -> Vec<&str> {
    deps.keys().map(String::as_str).collect()
}

impl PackageSource for BunSource<'_> {
    type Id = BunId;

    fn roots(&self) -> Vec<Self::Id> {
        if self.monorepo && !self.lockfile.workspaces.is_empty() {
            self.lockfile
                .workspaces
                .keys()
                .map(|path| BunId::Workspace(path.clone()))
                .collect()
        } else {
            vec![BunId::Workspace(String::new())]
        }
    }

    fn node(&self, id: &Self::Id) -> Option<RawNode> {
        match id {
            BunId::Workspace(path) => self.workspace_node(path),
            BunId::Package(key) => {
                let (name, version) = self.ident(key)?;
                Some(RawNode::new(name, version, self.package_dir(key)))
            }
        }
    }

    fn edges(&self, id: &Self::Id) -> Vec<Edge<Self::Id>> {
        match id {
            BunId::Workspace(path) => {
                let Some(workspace) = self.lockfile.workspaces.get(path) else {
                    return Vec::new();
                };
                // Nested keys under a workspace are prefixed with its name.
                let parent = match path.as_str() {
                    "" | "." => None,
                    _ => workspace.name.as_deref(),
                };
                self.edges_from(
                    parent,
                    [
                        (DependencyKind::Prod, dep_names(&workspace.dependencies)),
                        (DependencyKind::Dev, dep_names(&workspace.dev_dependencies)),
                        (DependencyKind::Optional, dep_names(&workspace.optional_dependencies)),
                    ],
                )
            }
            BunId::Package(key) => {
                let info = self
                    .lockfile
                    .packages
                    .get(key)
                    .and_then(|entry| entry.iter().find_map(Value::as_object));
                let names = |field: &str| {
                    info.and_then(|i| i.get(field))
                        .and_then(Value::as_object)
                        .map(|m| m.keys().map(String::as_str).collect::<Vec<_>>())
                        .unwrap_or_default()
                };
                self.edges_from(
                    Some(key.as_str()),
                    [
                        (DependencyKind::Prod, names("dependencies")),
                        (DependencyKind::Optional, names("optionalDependencies")),
                        // Only peers bun installed have a key to resolve to.
                        (DependencyKind::Prod, names("peerDependencies")),
                    ],
                )
            }
        }
    }
}
