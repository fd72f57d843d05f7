//! Package graph keyed by spec, with reverse edges

use crate::filter::FilterSet;
use crate::model::{BaseNode, RawNode};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// The dependency graph. Nodes reference each other by spec string only.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PackageGraph {
    nodes: BTreeMap<String, BaseNode>,
}

impl std::fmt::Debug for PackageGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageGraph")
            .field("node_count", &self.node_count())
            .field("edge_count", &self.edge_count())
            .finish()
    }
}

impl PackageGraph {
    /// Normalize adapter output: keep only edges whose target exists and add
    /// the matching reverse (dependents) edge for every one of them.
    pub fn from_raw(packages: BTreeMap<String, RawNode>) -> Self {
        let known: Vec<String> = packages.keys().cloned().collect();
        let mut nodes: BTreeMap<String, BaseNode> = packages
            .into_iter()
            .map(|(spec, raw)| (spec, BaseNode::from(raw)))
            .collect();

        let mut reverse: Vec<(String, String)> = Vec::new();
        for spec in &known {
            let Some(node) = nodes.get_mut(spec) else { continue };
            let before = node.raw.dependencies.len();
            node.raw
                .dependencies
                .retain(|dep| dep != spec && known.binary_search(dep).is_ok());
            if node.raw.dependencies.len() != before {
                tracing::debug!(
                    "Dropped {} unresolved edge(s) from {}",
                    before - node.raw.dependencies.len(),
                    spec
                );
            }
            for dep in &node.raw.dependencies {
                reverse.push((dep.clone(), spec.clone()));
            }
        }

        for (dep, dependent) in reverse {
            if let Some(node) = nodes.get_mut(&dep) {
                node.dependents.insert(dependent);
            }
        }

        PackageGraph { nodes }
    }

    /// Get a node by spec.
    pub fn node(&self, spec: &str) -> Option<&BaseNode> {
        self.nodes.get(spec)
    }

    pub fn node_mut(&mut self, spec: &str) -> Option<&mut BaseNode> {
        self.nodes.get_mut(spec)
    }

    pub fn contains(&self, spec: &str) -> bool {
        self.nodes.contains_key(spec)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total number of direct dependency edges.
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.raw.dependencies.len()).sum()
    }

    /// Iterate over all nodes in spec order.
    pub fn nodes(&self) -> impl Iterator<Item = &BaseNode> {
        self.nodes.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut BaseNode> {
        self.nodes.values_mut()
    }

    pub fn specs(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    /// Nodes that belong to the local monorepo.
    pub fn workspaces(&self) -> impl Iterator<Item = &BaseNode> {
        self.nodes.values().filter(|n| n.is_workspace())
    }

    /// Specs of every node the filter set accepts.
    pub fn filter(&self, filters: &FilterSet) -> Vec<String> {
        self.nodes
            .values()
            .filter(|n| filters.matches(n.name(), n.version()))
            .map(|n| n.spec().to_string())
            .collect()
    }

    /// Consume the graph, yielding its nodes.
    pub fn into_nodes(self) -> BTreeMap<String, BaseNode> {
        self.nodes
    }

    /// Index-based adjacency view used by the traversal passes.
    pub(crate) fn topology(&self) -> Topology {
        let mut inner = DiGraph::with_capacity(self.nodes.len(), self.edge_count());
        let mut index = HashMap::with_capacity(self.nodes.len());
        for spec in self.nodes.keys() {
            index.insert(spec.clone(), inner.add_node(spec.clone()));
        }
        for (spec, node) in &self.nodes {
            let from = index[spec];
            for dep in &node.raw.dependencies {
                if let Some(&to) = index.get(dep) {
                    inner.add_edge(from, to, ());
                }
            }
        }
        Topology { inner, index }
    }
}

/// Petgraph mirror of the package graph: node weights are specs.
pub(crate) struct Topology {
    pub inner: DiGraph<String, ()>,
    pub index: HashMap<String, NodeIndex>,
}

impl Topology {
    pub fn spec(&self, idx: NodeIndex) -> &str {
        &self.inner[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::Fixture;

    #[test]
    fn test_reverse_edges_are_symmetric() {
        let graph = Fixture::new()
            .workspace("app@1.0.0", &["a@1.0.0", "b@1.0.0"])
            .package("a@1.0.0", &["b@1.0.0"])
            .package("b@1.0.0", &[])
            .normalized();

        for node in graph.nodes() {
            for dep in &node.raw.dependencies {
                assert!(graph.node(dep).unwrap().dependents.contains(node.spec()));
            }
            for dependent in &node.dependents {
                assert!(graph.node(dependent).unwrap().raw.dependencies.contains(node.spec()));
            }
        }
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn test_unknown_dependency_is_silently_dropped() {
        let graph = Fixture::new()
            .workspace("app@1.0.0", &["ghost@9.9.9", "a@1.0.0"])
            .package("a@1.0.0", &[])
            .normalized();
        let app = graph.node("app@1.0.0").unwrap();
        assert_eq!(app.raw.dependencies.len(), 1);
        assert!(!graph.contains("ghost@9.9.9"));
    }
}
