//! Turn a propagated graph into resolved, enriched nodes

use crate::providers::create_source;
use crate::resolve::resolve_node;
use crate::services::{
    InstallSizeService, LatestMetaService, NpmMetaService, PublishDates, VulnerabilityService,
};
use crate::source::MetaSource;
use anyhow::Context;
use depscope_core::config::Concurrency;
use depscope_core::{Config, FsStore, KvStore, NpmMeta, PackageGraph, ResolvedNode};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Subdirectories of the cache directory, one store per service.
pub const STORE_NAMES: [&str; 5] = [
    "publish-dates",
    "npm-meta",
    "latest",
    "vulnerabilities",
    "install-size",
];

pub struct Enricher {
    publish_dates: PublishDates,
    npm_meta: NpmMetaService,
    latest: LatestMetaService,
    vulnerabilities: VulnerabilityService,
    install_size: InstallSizeService,
}

impl Enricher {
    /// Enricher backed by on-disk caches under the configured cache directory.
    pub fn new(config: &Config, root: &Path) -> anyhow::Result<Self> {
        let dir = config.cache_dir(root);
        Self::with_stores(create_source(config), &config.concurrency, |name| {
            let store = FsStore::open(dir.join(name))
                .with_context(|| format!("Failed to open {name} cache in {}", dir.display()))?;
            Ok(Arc::new(store) as Arc<dyn KvStore>)
        })
    }

    /// Build from an explicit source, opening one store per name in
    /// [`STORE_NAMES`].
    pub fn with_stores(
        source: Arc<dyn MetaSource>,
        concurrency: &Concurrency,
        mut open: impl FnMut(&str) -> anyhow::Result<Arc<dyn KvStore>>,
    ) -> anyhow::Result<Self> {
        let [publish, meta, latest, vulns, size] = STORE_NAMES;
        Ok(Self {
            publish_dates: PublishDates::new(
                Arc::clone(&source),
                open(publish)?,
                concurrency.publish_dates,
            ),
            npm_meta: NpmMetaService::new(Arc::clone(&source), open(meta)?, concurrency.npm_meta),
            latest: LatestMetaService::new(Arc::clone(&source), open(latest)?, concurrency.latest),
            vulnerabilities: VulnerabilityService::new(
                source,
                open(vulns)?,
                concurrency.vulnerabilities,
            ),
            install_size: InstallSizeService::new(open(size)?)?,
        })
    }

    /// Resolve every node and attach registry and size data.
    ///
    /// Workspace packages are resolved from their manifests only. Anything a
    /// service could not fetch stays empty on the node.
    pub async fn enrich(&self, graph: &PackageGraph) -> BTreeMap<String, ResolvedNode> {
        let mut resolved: BTreeMap<String, ResolvedNode> = graph
            .nodes()
            .map(|node| (node.spec().to_string(), resolve_node(node.clone())))
            .collect();

        let external: Vec<&ResolvedNode> =
            resolved.values().filter(|n| !n.base.is_workspace()).collect();
        let specs: Vec<String> = external.iter().map(|n| n.base.spec().to_string()).collect();
        let names: Vec<String> = external
            .iter()
            .map(|n| n.base.name())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();
        let dirs: Vec<(String, PathBuf)> = external
            .iter()
            .map(|n| (n.base.spec().to_string(), n.base.raw.filepath.clone()))
            .collect();
        tracing::info!(
            "Enriching {} packages ({} workspaces)",
            specs.len(),
            resolved.len() - specs.len()
        );

        let (mut metas, latest, vulnerabilities, sizes) = tokio::join!(
            self.npm_meta.get(&specs),
            self.latest.get(&names),
            self.vulnerabilities.get(&specs),
            self.install_size.get(&dirs),
        );

        // Publish dates are a lighter lookup; only used where npm-meta came
        // back without one.
        let undated: Vec<String> = specs
            .iter()
            .filter(|spec| metas.get(*spec).is_none_or(|m| m.published_at.is_none()))
            .cloned()
            .collect();
        if !undated.is_empty() {
            for (spec, date) in self.publish_dates.get(&undated).await {
                let meta = metas.entry(spec).or_insert_with(|| NpmMeta {
                    published_at: None,
                    deprecated: None,
                    integrity: None,
                });
                meta.published_at = Some(date);
            }
        }

        for (spec, node) in resolved.iter_mut() {
            if node.base.is_workspace() {
                continue;
            }
            node.npm_meta = metas.remove(spec);
            node.npm_meta_latest = latest.get(node.base.name()).cloned();
            node.vulnerabilities = vulnerabilities.get(spec).cloned().unwrap_or_default();
            node.install_size = sizes.get(spec).cloned();
        }
        resolved
    }

    /// Publish time of exact versions, without resolving a graph.
    pub async fn publish_dates(&self, specs: &[String]) -> HashMap<String, String> {
        self.publish_dates.get(specs).await
    }

    /// Drop expired latest-version entries from the cache.
    pub fn prune(&self) -> depscope_core::Result<usize> {
        self.latest.prune_expired()
    }
}
