//! Transitive closure, depth, and cluster propagation
//!
//! Every node is used once as a traversal root. The traversal itself never
//! touches the graph: it produces a list of [`Mutation`]s which are applied
//! after both the forward and the reverse pass for that root have finished.
//! All writes are set unions or `min`, so the result does not depend on the
//! order roots are processed in.

use crate::graph::{PackageGraph, Topology};
use crate::model::{CLUSTER_DEV, CLUSTER_OPTIONAL, CLUSTER_PROD};
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use std::collections::{HashSet, VecDeque};

/// A deferred write against the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// `spec` joins `node`'s flat dependencies.
    FlatDependency { node: NodeIndex, spec: NodeIndex },
    /// `spec` joins `node`'s flat dependents.
    FlatDependent { node: NodeIndex, spec: NodeIndex },
    /// `node` is at most `depth` edges from a workspace root.
    DepthAtMost { node: NodeIndex, depth: u32 },
    /// `node` inherits the clusters of its ancestor `from`.
    InheritClusters { node: NodeIndex, from: NodeIndex },
}

/// Populate flat dependencies/dependents, depth, flat clusters and
/// prod/dev/optional flags. Reverse edges must already be present.
pub fn propagate(graph: &mut PackageGraph) {
    let topology = graph.topology();
    let mut applied = 0usize;

    for root in topology.inner.node_indices() {
        let mutations = plan(graph, &topology, root);
        applied += mutations.len();
        apply(graph, &topology, &mutations);
    }

    for node in graph.nodes_mut() {
        node.prod = node.flat_clusters.contains(CLUSTER_PROD);
        node.dev = node.flat_clusters.contains(CLUSTER_DEV);
        node.optional = node.flat_clusters.contains(CLUSTER_OPTIONAL);
    }

    tracing::debug!(
        "Closure pass over {} nodes applied {} mutations",
        graph.node_count(),
        applied
    );
}

/// Traverse from `root` in both directions and list the writes it implies.
pub(crate) fn plan(graph: &PackageGraph, topology: &Topology, root: NodeIndex) -> Vec<Mutation> {
    let Some(root_node) = graph.node(topology.spec(root)) else {
        return Vec::new();
    };
    let is_workspace = root_node.is_workspace();
    let mut mutations = Vec::new();

    for (node, distance) in reach(topology, root, Direction::Outgoing) {
        mutations.push(Mutation::FlatDependency { node: root, spec: node });
        mutations.push(Mutation::FlatDependent { node, spec: root });
        if is_workspace {
            mutations.push(Mutation::DepthAtMost { node, depth: distance });
        } else if !root_node.raw.clusters.is_empty() {
            mutations.push(Mutation::InheritClusters { node, from: root });
        }
    }

    for (node, _) in reach(topology, root, Direction::Incoming) {
        mutations.push(Mutation::FlatDependent { node: root, spec: node });
        mutations.push(Mutation::FlatDependency { node, spec: root });
    }

    mutations
}

/// Apply a batch of mutations produced by [`plan`].
pub(crate) fn apply(graph: &mut PackageGraph, topology: &Topology, mutations: &[Mutation]) {
    for mutation in mutations {
        match *mutation {
            Mutation::FlatDependency { node, spec } => {
                let spec = topology.spec(spec).to_string();
                if let Some(n) = graph.node_mut(topology.spec(node)) {
                    n.flat_dependencies.insert(spec);
                }
            }
            Mutation::FlatDependent { node, spec } => {
                let spec = topology.spec(spec).to_string();
                if let Some(n) = graph.node_mut(topology.spec(node)) {
                    n.flat_dependents.insert(spec);
                }
            }
            Mutation::DepthAtMost { node, depth } => {
                if let Some(n) = graph.node_mut(topology.spec(node)) {
                    n.depth = Some(n.depth.map_or(depth, |d| d.min(depth)));
                }
            }
            Mutation::InheritClusters { node, from } => {
                let clusters = match graph.node(topology.spec(from)) {
                    Some(ancestor) => ancestor.raw.clusters.clone(),
                    None => continue,
                };
                if let Some(n) = graph.node_mut(topology.spec(node)) {
                    n.flat_clusters.extend(clusters);
                }
            }
        }
    }
}

/// Breadth-first reachability from `root`, excluding `root` itself.
/// Yields each reached node once with its edge distance from `root`.
fn reach(topology: &Topology, root: NodeIndex, direction: Direction) -> Vec<(NodeIndex, u32)> {
    let mut visited = HashSet::from([root]);
    let mut queue = VecDeque::from([(root, 0u32)]);
    let mut reached = Vec::new();

    while let Some((current, distance)) = queue.pop_front() {
        for next in topology.inner.neighbors_directed(current, direction) {
            if visited.insert(next) {
                reached.push((next, distance + 1));
                queue.push_back((next, distance + 1));
            }
        }
    }

    reached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::Fixture;

    fn closed(fixture: Fixture) -> PackageGraph {
        let mut graph = fixture.normalized();
        propagate(&mut graph);
        graph
    }

    fn set(items: &[&str]) -> std::collections::BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_end_to_end_prod_and_dev_paths() {
        let graph = closed(
            Fixture::new()
                .workspace("a@1.0.0", &["b@1.0.0", "c@1.0.0"])
                .package("b@1.0.0", &["c@1.0.0"])
                .package("c@1.0.0", &[])
                .cluster("b@1.0.0", CLUSTER_PROD)
                .cluster("c@1.0.0", CLUSTER_DEV)
                .cluster("c@1.0.0", CLUSTER_PROD),
        );

        let a = graph.node("a@1.0.0").unwrap();
        assert_eq!(a.flat_dependencies, set(&["b@1.0.0", "c@1.0.0"]));
        assert_eq!(a.depth, Some(0));

        let c = graph.node("c@1.0.0").unwrap();
        assert_eq!(c.flat_clusters, set(&[CLUSTER_DEV, CLUSTER_PROD]));
        assert_eq!(c.depth, Some(1));
        assert!(c.dev && c.prod);
        assert_eq!(c.flat_dependents, set(&["a@1.0.0", "b@1.0.0"]));
    }

    #[test]
    fn test_clusters_flow_down_from_non_workspace_ancestors() {
        // `shared` is only ever tagged prod by the adapter, but it sits under a
        // dev-only subtree as well, so it must end up flagged dev too.
        let graph = closed(
            Fixture::new()
                .workspace("app@1.0.0", &["lint@1.0.0", "lib@1.0.0"])
                .package("lint@1.0.0", &["shared@1.0.0"])
                .package("lib@1.0.0", &["shared@1.0.0"])
                .package("shared@1.0.0", &[])
                .cluster("lint@1.0.0", CLUSTER_DEV)
                .cluster("lib@1.0.0", CLUSTER_PROD)
                .cluster("shared@1.0.0", CLUSTER_PROD),
        );

        let shared = graph.node("shared@1.0.0").unwrap();
        assert!(shared.dev);
        assert!(shared.prod);
        assert!(!shared.optional);
        assert_eq!(shared.depth, Some(2));
    }

    #[test]
    fn test_cycle_terminates_and_excludes_self() {
        let graph = closed(
            Fixture::new()
                .workspace("app@1.0.0", &["x@1.0.0"])
                .package("x@1.0.0", &["y@1.0.0"])
                .package("y@1.0.0", &["x@1.0.0"]),
        );

        let x = graph.node("x@1.0.0").unwrap();
        assert!(!x.flat_dependencies.contains("x@1.0.0"));
        assert_eq!(x.flat_dependencies, set(&["y@1.0.0"]));
        assert_eq!(x.flat_dependents, set(&["app@1.0.0", "y@1.0.0"]));

        let y = graph.node("y@1.0.0").unwrap();
        assert!(!y.flat_dependents.contains("y@1.0.0"));
        assert_eq!(y.depth, Some(2));
    }

    #[test]
    fn test_depth_is_one_more_than_closest_dependent() {
        let graph = closed(
            Fixture::new()
                .workspace("app@1.0.0", &["a@1.0.0", "d@1.0.0"])
                .workspace("tool@1.0.0", &["b@1.0.0"])
                .package("a@1.0.0", &["b@1.0.0"])
                .package("b@1.0.0", &["c@1.0.0"])
                .package("c@1.0.0", &["d@1.0.0"])
                .package("d@1.0.0", &[]),
        );

        for node in graph.nodes() {
            if node.is_workspace() {
                assert_eq!(node.depth, Some(0));
                continue;
            }
            let closest = node
                .dependents
                .iter()
                .filter_map(|p| graph.node(p).and_then(|p| p.depth))
                .min()
                .unwrap();
            assert_eq!(node.depth, Some(closest + 1), "depth of {}", node.spec());
        }
    }

    #[test]
    fn test_flat_sets_are_mutually_consistent() {
        let graph = closed(
            Fixture::new()
                .workspace("app@1.0.0", &["a@1.0.0", "b@1.0.0"])
                .package("a@1.0.0", &["c@1.0.0"])
                .package("b@1.0.0", &["c@1.0.0", "a@1.0.0"])
                .package("c@1.0.0", &["a@1.0.0"]),
        );

        for node in graph.nodes() {
            for dep in &node.flat_dependencies {
                assert!(graph.node(dep).unwrap().flat_dependents.contains(node.spec()));
            }
        }
    }

    #[test]
    fn test_plan_does_not_touch_graph() {
        let graph = Fixture::new()
            .workspace("app@1.0.0", &["a@1.0.0"])
            .package("a@1.0.0", &[])
            .normalized();
        let topology = graph.topology();
        let root = topology.index["app@1.0.0"];
        let mutations = plan(&graph, &topology, root);

        assert!(mutations.contains(&Mutation::DepthAtMost {
            node: topology.index["a@1.0.0"],
            depth: 1
        }));
        assert!(graph.node("app@1.0.0").unwrap().flat_dependencies.is_empty());
    }
}
