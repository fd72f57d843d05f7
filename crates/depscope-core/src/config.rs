//! Project configuration: `depscope.toml` plus environment overrides

use crate::error::{Error, Result};
use crate::store;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file looked up at the project root.
pub const CONFIG_FILE: &str = "depscope.toml";

pub const ENV_REGISTRY: &str = "DEPSCOPE_REGISTRY";
pub const ENV_META_API: &str = "DEPSCOPE_META_API";
pub const ENV_CACHE_DIR: &str = "DEPSCOPE_CACHE_DIR";
pub const ENV_OFFLINE: &str = "DEPSCOPE_OFFLINE";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum dependency depth the adapters expand.
    pub depth: usize,
    /// Include every workspace package, not only the root one.
    pub monorepo: bool,
    /// Overrides the default `node_modules/.cache/depscope`.
    pub cache_dir: Option<PathBuf>,
    /// npm registry, used for advisories.
    pub registry: String,
    /// Batched metadata API.
    pub meta_api: String,
    /// Skip every network fetch.
    pub offline: bool,
    pub concurrency: Concurrency,
}

/// How many batches each enrichment service keeps in flight.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Concurrency {
    pub publish_dates: usize,
    pub npm_meta: usize,
    pub latest: usize,
    pub vulnerabilities: usize,
}

impl Default for Concurrency {
    fn default() -> Self {
        Concurrency {
            publish_dates: 10,
            npm_meta: 5,
            latest: 5,
            vulnerabilities: 2,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            depth: 25,
            monorepo: true,
            cache_dir: None,
            registry: "https://registry.npmjs.org".to_string(),
            meta_api: "https://npm.antfu.dev".to_string(),
            offline: false,
            concurrency: Concurrency::default(),
        }
    }
}

impl Config {
    /// Load `depscope.toml` from `root` if present, then apply environment
    /// overrides.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
            let config = Self::parse(&content)?;
            tracing::debug!("Loaded config from {}", path.display());
            config
        } else {
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from an environment-like lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(registry) = lookup(ENV_REGISTRY) {
            self.registry = registry;
        }
        if let Some(api) = lookup(ENV_META_API) {
            self.meta_api = api;
        }
        if let Some(dir) = lookup(ENV_CACHE_DIR) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(offline) = lookup(ENV_OFFLINE) {
            self.offline = matches!(offline.as_str(), "1" | "true" | "yes");
        }
    }

    /// Effective cache directory for a project root.
    pub fn cache_dir(&self, root: &Path) -> PathBuf {
        match &self.cache_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => store::cache_dir(root),
        }
    }
}
