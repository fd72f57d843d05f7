//! Test utilities for building package graphs

use crate::graph::PackageGraph;
use crate::model::{RawNode, split_spec};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Builder for small hand-written graphs.
#[derive(Default)]
pub struct Fixture {
    packages: BTreeMap<String, RawNode>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a workspace package.
    pub fn workspace(self, spec: &str, deps: &[&str]) -> Self {
        self.insert(spec, deps, true)
    }

    /// Add a third-party package.
    pub fn package(self, spec: &str, deps: &[&str]) -> Self {
        self.insert(spec, deps, false)
    }

    /// Attach a cluster label to an already added package.
    pub fn cluster(mut self, spec: &str, label: &str) -> Self {
        self.packages
            .get_mut(spec)
            .expect("cluster on unknown spec")
            .clusters
            .insert(label.to_string());
        self
    }

    pub fn build(self) -> BTreeMap<String, RawNode> {
        self.packages
    }

    /// Build and normalize, without running the closure pass.
    pub fn normalized(self) -> PackageGraph {
        PackageGraph::from_raw(self.packages)
    }

    fn insert(mut self, spec: &str, deps: &[&str], workspace: bool) -> Self {
        let (name, version) = split_spec(spec).expect("fixture spec must be name@version");
        let mut node = RawNode::new(name, version, PathBuf::from(format!("/repo/node_modules/{name}")));
        node.workspace = workspace;
        node.dependencies = deps.iter().map(|d| d.to_string()).collect();
        self.packages.insert(node.spec.clone(), node);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_builds_specs() {
        let packages = Fixture::new()
            .workspace("app@1.0.0", &["@scope/lib@2.0.0"])
            .package("@scope/lib@2.0.0", &[])
            .build();
        assert_eq!(packages["@scope/lib@2.0.0"].name, "@scope/lib");
        assert!(packages["app@1.0.0"].workspace);
    }
}
