//! Depscope Core: dependency graph model, closure pass, classifier and caches

pub mod classify;
pub mod closure;
pub mod config;
pub mod error;
pub mod filter;
pub mod graph;
pub mod manifest;
pub mod model;
pub mod store;


#[cfg(test)]
pub mod test_utils;

pub use classify::{ModuleSignals, classify_module_type};
pub use closure::propagate;
pub use config::Config;
pub use error::{Error, Result};
pub use filter::{FilterPattern, FilterSet, MatchMode};
pub use graph::PackageGraph;
pub use manifest::PackageManifest;
pub use model::{
    Advisory, BaseNode, CLUSTER_DEV, CLUSTER_OPTIONAL, CLUSTER_PROD, DependencyKind, InstallSize,
    LintLevel, LintMessage, ModuleType, NpmMeta, NpmMetaLatest, RawNode, ResolvedNode, SizeBucket,
    make_spec, split_spec,
};
pub use store::{FsStore, KvStore, KvStoreExt, MemoryStore, cache_dir, clear_cache};

use std::collections::BTreeMap;

/// Normalize adapter output and run the closure pass.
pub fn build_graph(packages: BTreeMap<String, RawNode>) -> PackageGraph {
    let mut graph = PackageGraph::from_raw(packages);
    propagate(&mut graph);
    graph
}
