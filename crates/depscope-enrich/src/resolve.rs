//! Build resolved nodes from installed manifests

use depscope_core::classify::TYPES_SCOPE;
use depscope_core::{
    BaseNode, LintLevel, LintMessage, ModuleType, PackageManifest, ResolvedNode,
    classify_module_type,
};
use serde_json::Value;
use std::collections::BTreeMap;

/// Derive everything a node's own `package.json` can tell. Registry-backed
/// fields are left empty for the enricher to fill in. A missing or broken
/// manifest yields a node with only the classifier's fallback.
pub fn resolve_node(base: BaseNode) -> ResolvedNode {
    let mut manifest = match PackageManifest::read(&base.raw.filepath) {
        Ok(manifest) => manifest,
        Err(e) => {
            tracing::debug!("No manifest for {}: {}", base.spec(), e);
            PackageManifest::default()
        }
    };
    if manifest.name.is_none() {
        manifest.name = Some(base.name().to_string());
    }

    let module = classify_module_type(&manifest);
    let license = manifest.license.as_ref().and_then(license_text);
    let mut node = ResolvedNode {
        module,
        license,
        author: manifest.author.as_ref().and_then(person_name),
        repository: manifest.repository.as_ref().and_then(repository_url),
        fundings: manifest.funding.as_ref().map(funding_urls).unwrap_or_default(),
        exports: manifest.exports.clone(),
        engines: manifest.engines.as_ref().map(engines).unwrap_or_default(),
        install_size: None,
        npm_meta: None,
        npm_meta_latest: None,
        vulnerabilities: Vec::new(),
        lints: Vec::new(),
        base,
    };
    node.lints = lint(&node);
    node
}

fn lint(node: &ResolvedNode) -> Vec<LintMessage> {
    let mut lints = Vec::new();
    if node.base.is_workspace() {
        return lints;
    }
    if node.license.is_none() {
        lints.push(LintMessage {
            code: "missing-license".to_string(),
            level: LintLevel::Warning,
            message: format!("{} does not declare a license", node.base.spec()),
        });
    }
    if node.module == ModuleType::Faux {
        lints.push(LintMessage {
            code: "faux-esm".to_string(),
            level: LintLevel::Info,
            message: "Has a `module` field for bundlers but ships CommonJS to Node".to_string(),
        });
    }
    if node.base.prod && node.base.name().starts_with(TYPES_SCOPE) {
        lints.push(LintMessage {
            code: "types-in-prod".to_string(),
            level: LintLevel::Warning,
            message: "Type declarations are installed as a production dependency".to_string(),
        });
    }
    lints
}

/// `"MIT"`, `{ "type": "MIT" }` or the legacy `[{ "type": ... }]` list.
fn license_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => map.get("type").and_then(license_text),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(license_text).collect();
            (!parts.is_empty()).then(|| {
                if parts.len() == 1 {
                    parts[0].clone()
                } else {
                    format!("({})", parts.join(" OR "))
                }
            })
        }
        _ => None,
    }
}

/// `"Name <email> (url)"` or `{ "name": ... }`, reduced to the name.
fn person_name(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("name")?.as_str()?,
        _ => return None,
    };
    let name = raw.split(['<', '(']).next().unwrap_or(raw).trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Normalize the many `repository` spellings to a browsable URL.
fn repository_url(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("url")?.as_str()?,
        _ => return None,
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for (prefix, host) in [
        ("github:", "https://github.com/"),
        ("gitlab:", "https://gitlab.com/"),
        ("bitbucket:", "https://bitbucket.org/"),
    ] {
        if let Some(path) = raw.strip_prefix(prefix) {
            return Some(format!("{host}{path}"));
        }
    }
    if !raw.contains(':') && raw.split('/').count() == 2 {
        return Some(format!("https://github.com/{raw}"));
    }

    let url = raw.strip_prefix("git+").unwrap_or(raw);
    let url = url.strip_suffix(".git").unwrap_or(url);
    let url = match url.strip_prefix("git://") {
        Some(rest) => format!("https://{rest}"),
        None => match url.strip_prefix("ssh://git@") {
            Some(rest) => format!("https://{rest}"),
            None => url.to_string(),
        },
    };
    Some(match url.strip_prefix("git@") {
        Some(rest) => format!("https://{}", rest.replacen(':', "/", 1)),
        None => url,
    })
}

/// `funding` may be a URL, an object with `url`, or a list of either.
fn funding_urls(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Object(map) => map
            .get("url")
            .and_then(Value::as_str)
            .map(|url| vec![url.to_string()])
            .unwrap_or_default(),
        Value::Array(items) => items.iter().flat_map(funding_urls).collect(),
        _ => Vec::new(),
    }
}

fn engines(value: &Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use depscope_core::RawNode;
    use serde_json::json;
    use std::path::Path;

    fn node_at(dir: &Path, name: &str, manifest: Value) -> BaseNode {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("package.json"), manifest.to_string()).unwrap();
        BaseNode::from(RawNode::new(name, "1.0.0", dir.to_path_buf()))
    }

    #[test]
    fn test_resolve_reads_manifest_fields() {
        let dir = tempfile::tempdir().unwrap();
        let base = node_at(
            dir.path(),
            "pkg",
            json!({
                "name": "pkg",
                "version": "1.0.0",
                "license": { "type": "MIT" },
                "author": { "name": "Ada", "email": "ada@example.com" },
                "repository": { "type": "git", "url": "git+https://github.com/ada/pkg.git" },
                "funding": ["https://github.com/sponsors/ada", { "type": "opencollective", "url": "https://opencollective.com/pkg" }],
                "engines": { "node": ">=18" },
                "exports": { ".": { "import": "./index.mjs", "require": "./index.cjs" } },
            }),
        );

        let node = resolve_node(base);
        assert_eq!(node.module, ModuleType::Dual);
        assert_eq!(node.license.as_deref(), Some("MIT"));
        assert_eq!(node.author.as_deref(), Some("Ada"));
        assert_eq!(node.repository.as_deref(), Some("https://github.com/ada/pkg"));
        assert_eq!(node.fundings.len(), 2);
        assert_eq!(node.engines["node"], ">=18");
        assert!(node.exports.is_some());
        assert!(node.lints.is_empty());
    }

    #[test]
    fn test_lints() {
        let dir = tempfile::tempdir().unwrap();
        let mut base = node_at(
            &dir.path().join("faux"),
            "faux",
            json!({ "name": "faux", "main": "index.js", "module": "index.esm.js" }),
        );
        base.prod = true;
        let codes: Vec<String> = resolve_node(base).lints.into_iter().map(|l| l.code).collect();
        assert_eq!(codes, vec!["missing-license", "faux-esm"]);

        let mut types = node_at(
            &dir.path().join("types"),
            "@types/node",
            json!({ "name": "@types/node", "license": "MIT", "types": "index.d.ts" }),
        );
        types.prod = true;
        let node = resolve_node(types);
        assert_eq!(node.module, ModuleType::Dts);
        assert_eq!(node.lints[0].code, "types-in-prod");
    }

    #[test]
    fn test_missing_manifest_falls_back() {
        let base = BaseNode::from(RawNode::new("ghost", "1.0.0", "/nonexistent/ghost".into()));
        let node = resolve_node(base);
        assert_eq!(node.module, ModuleType::Cjs);
        assert!(node.license.is_none());
    }

    #[test]
    fn test_workspaces_are_not_linted() {
        let dir = tempfile::tempdir().unwrap();
        let mut base = node_at(dir.path(), "app", json!({ "name": "app", "private": true }));
        base.raw.workspace = true;
        assert!(resolve_node(base).lints.is_empty());
    }

    #[test]
    fn test_repository_spellings() {
        let cases = [
            ("github:user/repo", "https://github.com/user/repo"),
            ("user/repo", "https://github.com/user/repo"),
            ("git://github.com/user/repo.git", "https://github.com/user/repo"),
            ("git@github.com:user/repo.git", "https://github.com/user/repo"),
            ("ssh://git@github.com/user/repo.git", "https://github.com/user/repo"),
            ("https://gitlab.com/group/proj", "https://gitlab.com/group/proj"),
        ];
        for (raw, expected) in cases {
            assert_eq!(repository_url(&json!(raw)).as_deref(), Some(expected), "{raw}");
        }
    }

    #[test]
    fn test_license_and_author_shapes() {
        assert_eq!(
            license_text(&json!([{ "type": "MIT" }, { "type": "Apache-2.0" }])).as_deref(),
            Some("(MIT OR Apache-2.0)")
        );
        assert_eq!(license_text(&json!("")), None);
        assert_eq!(
            person_name(&json!("Sindre Sorhus <sindre@example.com> (https://example.com)")).as_deref(),
            Some("Sindre Sorhus")
        );
    }
}
