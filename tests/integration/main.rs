//! Integration tests for Depscope
//!
//! These run the whole pipeline: detection, adapter, normalization, closure
//! pass and filtering, with canned package-manager output.

use depscope_adapters::{
    FixtureRunner, ManagerKind, NodeFilter, ResolveOptions, list_dependencies,
};
use depscope_core::{Config, FilterSet, MatchMode, PackageGraph, RawNode, build_graph};
use depscope_enrich::Enricher;
use serde_json::json;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

const BUN_LOCK: &str = r#"{
  "lockfileVersion": 1,
  "workspaces": {
    "": {
      "name": "site",
      "dependencies": { "react": "^18.2.0", "@site/icons": "workspace:*" },
      "devDependencies": { "@types/react": "^18.2.0" },
    },
    "packages/icons": {
      "name": "@site/icons",
      "version": "1.0.0",
      "dependencies": { "react": "^18.2.0" },
    },
  },
  "packages": {
    "@site/icons": ["@site/icons@workspace:packages/icons"],
    "@types/react": ["@types/react@18.2.45", "", { "dependencies": { "csstype": "^3.0.2" } }, "sha512-a"],
    "csstype": ["csstype@3.1.3", "", {}, "sha512-b"],
    "loose-envify": ["loose-envify@1.4.0", "", {}, "sha512-c"],
    "react": ["react@18.2.0", "", { "dependencies": { "loose-envify": "^1.1.0" } }, "sha512-d"],
  }
}
"#;

fn bun_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "bun.lock", BUN_LOCK);
    write(root, "package.json", r#"{"name": "site", "version": "0.0.1", "private": true}"#);
    write(
        root,
        "packages/icons/package.json",
        r#"{"name": "@site/icons", "version": "1.0.0", "type": "module", "exports": "./index.js"}"#,
    );
    write(
        root,
        "node_modules/react/package.json",
        r#"{"name": "react", "version": "18.2.0", "license": "MIT", "main": "index.js",
            "repository": {"type": "git", "url": "https://github.com/facebook/react.git"}}"#,
    );
    write(root, "node_modules/react/index.js", "module.exports = require('./cjs/react.js');\n");
    write(
        root,
        "node_modules/@types/react/package.json",
        r#"{"name": "@types/react", "version": "18.2.45", "license": "MIT", "types": "index.d.ts"}"#,
    );
    write(root, "node_modules/@types/react/index.d.ts", "export {};\n");
    dir
}

async fn bun_graph(root: &Path) -> PackageGraph {
    let result = list_dependencies(&ResolveOptions::new(root), &FixtureRunner::new())
        .await
        .unwrap();
    assert_eq!(result.package_manager, ManagerKind::Bun);
    build_graph(result.packages)
}

fn matching(graph: &PackageGraph, patterns: &[&str], mode: MatchMode) -> Vec<String> {
    graph.filter(&FilterSet::parse(patterns, mode).unwrap())
}

#[tokio::test]
async fn test_bun_pipeline_flags_and_depth() {
    let dir = bun_project();
    let graph = bun_graph(dir.path()).await;

    assert_eq!(graph.node_count(), 6);
    assert_eq!(graph.workspaces().count(), 2);

    let react = graph.node("react@18.2.0").unwrap();
    assert!(react.prod && !react.dev);
    assert_eq!(react.depth, Some(1));
    assert!(react.dependents.contains("site@0.0.1"));
    assert!(react.dependents.contains("@site/icons@1.0.0"));

    let csstype = graph.node("csstype@3.1.3").unwrap();
    assert!(csstype.dev && !csstype.prod);
    assert_eq!(csstype.depth, Some(2));
    assert!(csstype.flat_dependents.contains("site@0.0.1"));

    let envify = graph.node("loose-envify@1.4.0").unwrap();
    assert!(envify.prod);
    assert!(envify.flat_dependents.contains("@site/icons@1.0.0"));
}

#[tokio::test]
async fn test_bun_pipeline_queries() {
    let dir = bun_project();
    let graph = bun_graph(dir.path()).await;

    assert_eq!(
        matching(&graph, &["@types/*", "csstype"], MatchMode::Any),
        vec!["@types/react@18.2.45", "csstype@3.1.3"]
    );
    assert_eq!(
        matching(&graph, &["react@>=18", "react@<18.3"], MatchMode::All),
        vec!["react@18.2.0"]
    );
    assert!(matching(&graph, &["react@^17"], MatchMode::Any).is_empty());
}

#[tokio::test]
async fn test_offline_enrichment_of_bun_project() {
    let dir = bun_project();
    let root = dir.path();
    let graph = bun_graph(root).await;
    let config = Config {
        offline: true,
        ..Default::default()
    };

    let resolved = Enricher::new(&config, root).unwrap().enrich(&graph).await;
    assert_eq!(resolved.len(), graph.node_count());

    let react = &resolved["react@18.2.0"];
    assert_eq!(react.license.as_deref(), Some("MIT"));
    assert_eq!(react.repository.as_deref(), Some("https://github.com/facebook/react"));
    assert_eq!(react.install_size.as_ref().map(|s| s.files), Some(2));
    assert!(react.lints.is_empty());

    let icons = &resolved["@site/icons@1.0.0"];
    assert_eq!(serde_json::to_value(icons.module).unwrap(), json!("esm"));
    assert!(icons.install_size.is_none());

    let types = &resolved["@types/react@18.2.45"];
    assert_eq!(serde_json::to_value(types.module).unwrap(), json!("dts"));
    assert!(types.lints.is_empty(), "dev-only types are fine: {:?}", types.lints);

    // Not installed in the fixture: no manifest, so unlicensed.
    let csstype = &resolved["csstype@3.1.3"];
    assert_eq!(csstype.lints[0].code, "missing-license");
}

#[tokio::test]
async fn test_pnpm_pipeline_with_skipped_dependencies() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "pnpm-lock.yaml", "lockfileVersion: '9.0'\n");
    write(root, "package.json", r#"{"name": "api", "version": "2.0.0"}"#);

    let store = root.join("node_modules/.pnpm");
    let output = json!([{
        "name": "api",
        "version": "2.0.0",
        "path": root,
        "dependencies": {
            "express": {
                "from": "express",
                "version": "4.18.2",
                "path": store.join("express@4.18.2/node_modules/express"),
                "dependencies": {
                    "debug": {
                        "from": "debug",
                        "version": "2.6.9",
                        "path": store.join("debug@2.6.9/node_modules/debug"),
                    },
                },
            },
        },
    }]);
    let runner = FixtureRunner::new()
        .with("pnpm --version", "9.1.0\n")
        .with("pnpm ls --json --depth 24 --recursive", output.to_string());

    let mut options = ResolveOptions::new(root.join("src"));
    std::fs::create_dir_all(root.join("src")).unwrap();
    let skip = FilterSet::parse(["express"], MatchMode::Any).unwrap();
    let filter: NodeFilter = Arc::new(move |node: &RawNode| !skip.matches(&node.name, &node.version));
    options.dependencies_filter = Some(filter);

    let result = list_dependencies(&options, &runner).await.unwrap();
    assert_eq!(result.root, root);
    assert_eq!(result.package_manager_version.as_deref(), Some("9.1.0"));

    let graph = build_graph(result.packages);
    assert!(graph.contains("express@4.18.2"));
    assert!(!graph.contains("debug@2.6.9"));
    assert_eq!(graph.edge_count(), 1);
}

#[test]
fn test_cli_help_and_version() {
    let help = Command::new(env!("CARGO_BIN_EXE_depscope"))
        .arg("--help")
        .output()
        .expect("Failed to execute depscope");
    let stdout = String::from_utf8_lossy(&help.stdout);
    assert!(stdout.contains("Inspect the dependency graph of a JavaScript project"));
    for command in ["list", "query", "enrich", "clear", "version"] {
        assert!(stdout.contains(command), "missing {command}");
    }

    let version = Command::new(env!("CARGO_BIN_EXE_depscope"))
        .arg("version")
        .output()
        .expect("Failed to execute depscope");
    assert_eq!(
        String::from_utf8_lossy(&version.stdout).trim(),
        format!("Depscope v{}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn test_cli_reports_missing_project() {
    let dir = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_depscope"))
        .args(["list", "--root"])
        .arg(dir.path())
        .output()
        .expect("Failed to execute depscope");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No package manager lockfile"));
}
