//! npm registry and the fast metadata mirror at npm.antfu.dev

use crate::source::{LatestVersion, MetaSource};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use depscope_core::{Advisory, NpmMeta, make_spec, split_spec};
use node_semver::{Range, Version};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet, HashMap};

const USER_AGENT: &str = concat!("depscope/", env!("CARGO_PKG_VERSION"));

pub struct NpmRegistrySource {
    client: reqwest::Client,
    registry: String,
    meta_api: String,
}

impl NpmRegistrySource {
    pub fn new(registry: impl Into<String>, meta_api: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            registry: registry.into().trim_end_matches('/').to_string(),
            meta_api: meta_api.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {url}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} returned {}: {}", url, status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {url}"))
    }
}

/// The mirror answers a single lookup with an object and several with an array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolvedVersion {
    name: String,
    version: String,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageVersions {
    name: String,
    #[serde(default)]
    versions_meta: BTreeMap<String, VersionMeta>,
}

#[derive(Debug, Deserialize)]
struct VersionMeta {
    time: Option<String>,
    deprecated: Option<String>,
    integrity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BulkAdvisory {
    id: u64,
    title: String,
    severity: String,
    url: String,
    vulnerable_versions: String,
}

fn unique_names(specs: &[String]) -> BTreeSet<&str> {
    specs
        .iter()
        .filter_map(|spec| split_spec(spec).map(|(name, _)| name))
        .collect()
}

#[async_trait::async_trait]
impl MetaSource for NpmRegistrySource {
    async fn publish_dates(&self, specs: &[String]) -> Result<HashMap<String, String>> {
        let url = format!("{}/{}", self.meta_api, specs.join("+"));
        let resolved: OneOrMany<ResolvedVersion> = self.get_json(&url).await?;
        Ok(resolved
            .into_vec()
            .into_iter()
            .filter_map(|r| Some((make_spec(&r.name, &r.version), r.published_at?)))
            .collect())
    }

    async fn npm_meta(&self, specs: &[String]) -> Result<HashMap<String, NpmMeta>> {
        let names = unique_names(specs).into_iter().collect::<Vec<_>>().join("+");
        let url = format!("{}/versions/{}?metadata=true", self.meta_api, names);
        let packages: OneOrMany<PackageVersions> = self.get_json(&url).await?;

        let wanted: BTreeSet<&str> = specs.iter().map(String::as_str).collect();
        let mut out = HashMap::new();
        for package in packages.into_vec() {
            for (version, meta) in package.versions_meta {
                let spec = make_spec(&package.name, &version);
                if wanted.contains(spec.as_str()) {
                    out.insert(
                        spec,
                        NpmMeta {
                            published_at: meta.time,
                            deprecated: meta.deprecated,
                            integrity: meta.integrity,
                        },
                    );
                }
            }
        }
        Ok(out)
    }

    async fn latest(&self, names: &[String]) -> Result<HashMap<String, LatestVersion>> {
        let url = format!("{}/{}", self.meta_api, names.join("+"));
        let resolved: OneOrMany<ResolvedVersion> = self.get_json(&url).await?;
        Ok(resolved
            .into_vec()
            .into_iter()
            .map(|r| {
                let published_at = r
                    .published_at
                    .as_deref()
                    .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                    .map(|t| t.with_timezone(&Utc));
                (
                    r.name,
                    LatestVersion {
                        version: r.version,
                        published_at,
                    },
                )
            })
            .collect())
    }

    async fn advisories(&self, specs: &[String]) -> Result<HashMap<String, Vec<Advisory>>> {
        let mut body: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for spec in specs {
            if let Some((name, version)) = split_spec(spec) {
                body.entry(name).or_default().push(version);
            }
        }

        let url = format!("{}/-/npm/v1/security/advisories/bulk", self.registry);
        let response = self
            .client
            .post(&url)
            .header("User-Agent", USER_AGENT)
            .json(&body)
            .send()
            .await
            .context("Failed to send advisory bulk request")?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Advisory endpoint returned {}: {}", status, text);
        }
        let advisories: HashMap<String, Vec<BulkAdvisory>> = response
            .json()
            .await
            .context("Failed to parse advisory bulk response")?;

        Ok(match_advisories(specs, advisories))
    }
}

/// Attach each advisory to the specs whose version falls in its range.
fn match_advisories(
    specs: &[String],
    advisories: HashMap<String, Vec<BulkAdvisory>>,
) -> HashMap<String, Vec<Advisory>> {
    let mut out: HashMap<String, Vec<Advisory>> = HashMap::new();
    for spec in specs {
        let Some((name, version)) = split_spec(spec) else {
            continue;
        };
        let matched = match (advisories.get(name), Version::parse(version)) {
            (Some(list), Ok(version)) => list
                .iter()
                .filter(|a| {
                    Range::parse(&a.vulnerable_versions).is_ok_and(|r| r.satisfies(&version))
                })
                .map(|a| Advisory {
                    id: a.id,
                    title: a.title.clone(),
                    severity: a.severity.clone(),
                    url: a.url.clone(),
                    vulnerable_versions: a.vulnerable_versions.clone(),
                })
                .collect(),
            _ => Vec::new(),
        };
        out.insert(spec.clone(), matched);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_or_many() {
        let one: OneOrMany<ResolvedVersion> =
            serde_json::from_str(r#"{"name": "vite", "version": "5.0.0", "publishedAt": "2023-11-16T00:00:00.000Z"}"#).unwrap();
        assert_eq!(one.into_vec().len(), 1);
        let many: OneOrMany<ResolvedVersion> = serde_json::from_str(
            r#"[{"name": "a", "version": "1.0.0"}, {"name": "b", "version": "2.0.0"}]"#,
        )
        .unwrap();
        assert_eq!(many.into_vec().len(), 2);
    }

    #[test]
    fn test_advisories_match_by_range() {
        let advisories: HashMap<String, Vec<BulkAdvisory>> = serde_json::from_str(
            r#"{"lodash": [{
                "id": 1523,
                "title": "Prototype Pollution",
                "severity": "high",
                "url": "https://github.com/advisories/GHSA-jf85-cpcp-j695",
                "vulnerable_versions": "<4.17.12"
            }]}"#,
        )
        .unwrap();
        let specs = vec![
            "lodash@4.17.11".to_string(),
            "lodash@4.17.21".to_string(),
            "left-pad@1.3.0".to_string(),
        ];
        let matched = match_advisories(&specs, advisories);
        assert_eq!(matched["lodash@4.17.11"].len(), 1);
        assert_eq!(matched["lodash@4.17.11"][0].severity, "high");
        assert!(matched["lodash@4.17.21"].is_empty());
        assert!(matched["left-pad@1.3.0"].is_empty());
    }

    #[test]
    fn test_unique_names_dedups_versions() {
        let specs = vec![
            "@vue/shared@3.4.0".to_string(),
            "@vue/shared@3.3.0".to_string(),
            "vue@3.4.0".to_string(),
        ];
        assert_eq!(unique_names(&specs).into_iter().collect::<Vec<_>>(), vec!["@vue/shared", "vue"]);
    }
}
