//! Depth-limited traversal shared by all adapters
//!
//! Each adapter exposes its manager-native records through [`PackageSource`];
//! [`walk`] turns them into raw nodes. Cluster tagging follows the edge that
//! reached a node: edges leaving a workspace set the mode from the manifest
//! field they were declared in, edges leaving any other node inherit the mode
//! that reached their parent.

use crate::adapter::ResolveOptions;
use depscope_core::{DependencyKind, RawNode};
use std::collections::{BTreeMap, HashMap};

/// One outgoing edge of a manager record.
#[derive(Debug, Clone)]
pub(crate) struct Edge<I> {
    pub target: I,
    pub kind: DependencyKind,
    /// Extra labels for the target, such as `catalog:default`.
    pub clusters: Vec<String>,
}

impl<I> Edge<I> {
    pub fn new(target: I, kind: DependencyKind) -> Self {
        Edge {
            target,
            kind,
            clusters: Vec::new(),
        }
    }
}

pub(crate) trait PackageSource {
    /// Handle on a manager-native record.
    type Id: Clone;

    /// Traversal starting points, in order.
    fn roots(&self) -> Vec<Self::Id>;

    /// Build the node for a record without any edges. Returns `None` for
    /// records that cannot be turned into a package.
    fn node(&self, id: &Self::Id) -> Option<RawNode>;

    /// Outgoing edges. Targets that cannot be resolved are left out.
    fn edges(&self, id: &Self::Id) -> Vec<Edge<Self::Id>>;
}

/// Walk every root and collect the reachable nodes keyed by spec.
pub(crate) fn walk<S: PackageSource>(
    source: &S,
    options: &ResolveOptions,
) -> BTreeMap<String, RawNode> {
    let mut walker = Walker {
        source,
        options,
        packages: BTreeMap::new(),
        expanded: HashMap::new(),
    };
    for root in source.roots() {
        walker.visit(&root, None, None, &[], 0);
    }
    walker.packages
}

struct Walker<'a, S: PackageSource> {
    source: &'a S,
    options: &'a ResolveOptions,
    packages: BTreeMap<String, RawNode>,
    /// Shallowest level each spec has been expanded from.
    expanded: HashMap<String, usize>,
}

impl<S: PackageSource> Walker<'_, S> {
    fn visit(
        &mut self,
        id: &S::Id,
        mode: Option<DependencyKind>,
        parent: Option<&str>,
        extra_clusters: &[String],
        level: usize,
    ) {
        let Some(node) = self.source.node(id) else {
            return;
        };
        let spec = node.spec.clone();

        if let Some(parent) = parent.and_then(|p| self.packages.get_mut(p)) {
            parent.dependencies.insert(spec.clone());
        }
        let entry = self.packages.entry(spec.clone()).or_insert(node);
        if let Some(mode) = mode {
            entry.clusters.insert(mode.cluster().to_string());
        }
        entry.clusters.extend(extra_clusters.iter().cloned());

        if !self.options.should_traverse(entry) || level >= self.options.depth {
            return;
        }
        // A node reached again on a shorter path is expanded again, so the
        // result does not depend on the order edges are listed in.
        if self.expanded.get(&spec).is_some_and(|&best| best <= level) {
            return;
        }
        self.expanded.insert(spec.clone(), level);
        if !self.options.should_expand(entry) {
            return;
        }

        let workspace = entry.workspace;
        for edge in self.source.edges(id) {
            let next_mode = if workspace {
                Some(edge.kind)
            } else {
                Some(mode.unwrap_or(edge.kind))
            };
            self.visit(&edge.target, next_mode, Some(&spec), &edge.clusters, level + 1);
        }
    }
}
