//! CLI command implementations

use crate::GraphArgs;
use anyhow::Context;
use depscope_adapters::{ListResult, NodeFilter, ResolveOptions, SystemRunner, list_dependencies};
use depscope_core::{BaseNode, Config, FilterSet, MatchMode, PackageGraph, RawNode, build_graph};
use depscope_enrich::Enricher;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub async fn list(root: PathBuf, args: GraphArgs, json: bool) -> anyhow::Result<()> {
    let config = load_config(&root)?;
    let graph = load_graph(&root, &config, &args).await?;

    if json {
        let nodes: Vec<&BaseNode> = graph.nodes().collect();
        println!("{}", serde_json::to_string_pretty(&nodes)?);
        return Ok(());
    }
    for node in graph.nodes() {
        println!("{}", describe(node));
    }
    Ok(())
}

pub async fn query(
    root: PathBuf,
    args: GraphArgs,
    patterns: Vec<String>,
    all: bool,
) -> anyhow::Result<()> {
    let mode = if all { MatchMode::All } else { MatchMode::Any };
    let filters = FilterSet::parse(&patterns, mode).context("Invalid pattern")?;

    let config = load_config(&root)?;
    let graph = load_graph(&root, &config, &args).await?;

    let matched = graph.filter(&filters);
    tracing::info!("{} of {} packages match", matched.len(), graph.node_count());
    for spec in matched {
        if let Some(node) = graph.node(&spec) {
            println!("{}", describe(node));
        }
    }
    Ok(())
}

pub async fn enrich(root: PathBuf, args: GraphArgs, offline: bool, json: bool) -> anyhow::Result<()> {
    let mut config = load_config(&root)?;
    config.offline |= offline;
    let graph = load_graph(&root, &config, &args).await?;

    let enricher = Enricher::new(&config, &root)?;
    let resolved = enricher.enrich(&graph).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
        return Ok(());
    }
    for node in resolved.values() {
        let mut line = format!("{} [{:?}]", node.base.spec(), node.module);
        if let Some(license) = &node.license {
            line.push_str(&format!(" {license}"));
        }
        if let Some(latest) = &node.npm_meta_latest {
            if latest.version != node.base.version() {
                line.push_str(&format!(" (latest {})", latest.version));
            }
        }
        if let Some(size) = &node.install_size {
            line.push_str(&format!(" {} files, {} bytes", size.files, size.bytes));
        }
        if !node.vulnerabilities.is_empty() {
            line.push_str(&format!(" {} advisories", node.vulnerabilities.len()));
        }
        println!("{line}");
        for lint in &node.lints {
            println!("  {:?} {}: {}", lint.level, lint.code, lint.message);
        }
    }
    Ok(())
}

pub fn clear(root: PathBuf, expired: bool) -> anyhow::Result<()> {
    let config = load_config(&root)?;
    if expired {
        let removed = Enricher::new(&config, &root)?.prune()?;
        tracing::info!("Removed {} expired entries", removed);
        return Ok(());
    }

    let dir = config.cache_dir(&root);
    tracing::info!("Clearing cache at: {}", dir.display());
    depscope_core::clear_cache(&dir)?;
    tracing::info!("Cache cleared");
    Ok(())
}

fn load_config(root: &Path) -> anyhow::Result<Config> {
    Config::load(root).with_context(|| format!("Failed to load config from {}", root.display()))
}

/// Detect the manager, list packages and run the closure pass.
async fn load_graph(root: &Path, config: &Config, args: &GraphArgs) -> anyhow::Result<PackageGraph> {
    let options = resolve_options(root, config, args)?;
    let ListResult {
        root: project_root,
        package_manager,
        packages,
        ..
    } = list_dependencies(&options, &SystemRunner).await?;

    tracing::info!(
        "Listed {} packages from {} ({})",
        packages.len(),
        project_root.display(),
        package_manager
    );
    let graph = build_graph(packages);
    tracing::info!(
        "Graph has {} nodes, {} edges, {} workspaces",
        graph.node_count(),
        graph.edge_count(),
        graph.workspaces().count()
    );
    Ok(graph)
}

fn resolve_options(root: &Path, config: &Config, args: &GraphArgs) -> anyhow::Result<ResolveOptions> {
    let mut options = ResolveOptions::from_config(root, config);
    if let Some(depth) = args.depth {
        options.depth = depth;
    }
    if args.no_monorepo {
        options.monorepo = false;
    }
    if !args.skip.is_empty() {
        let skip = FilterSet::parse(&args.skip, MatchMode::Any).context("Invalid --skip pattern")?;
        let filter: NodeFilter = Arc::new(move |node: &RawNode| {
            node.workspace || !skip.matches(&node.name, &node.version)
        });
        options.dependencies_filter = Some(filter);
    }
    Ok(options)
}

fn describe(node: &BaseNode) -> String {
    let mut kinds = Vec::new();
    if node.is_workspace() {
        kinds.push("workspace");
    }
    if node.prod {
        kinds.push("prod");
    }
    if node.dev {
        kinds.push("dev");
    }
    if node.optional {
        kinds.push("optional");
    }
    let depth = node.depth.map_or_else(|| "-".to_string(), |d| d.to_string());
    format!("{} depth={} {}", node.spec(), depth, kinds.join(","))
}
