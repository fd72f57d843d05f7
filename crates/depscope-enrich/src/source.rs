//! Where registry metadata comes from

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depscope_core::{Advisory, NpmMeta};
use std::collections::HashMap;

/// The newest published version of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestVersion {
    pub version: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// A batched metadata backend. Every call takes a batch and returns the
/// entries it found; absent keys mean "no data", an `Err` means the whole
/// batch failed and may be retried item by item.
#[async_trait]
pub trait MetaSource: Send + Sync {
    /// RFC 3339 publish time per `name@version`.
    async fn publish_dates(&self, specs: &[String]) -> Result<HashMap<String, String>>;

    /// Registry metadata per `name@version`.
    async fn npm_meta(&self, specs: &[String]) -> Result<HashMap<String, NpmMeta>>;

    /// Latest version per package name.
    async fn latest(&self, names: &[String]) -> Result<HashMap<String, LatestVersion>>;

    /// Advisories affecting each `name@version`. Specs without advisories may
    /// be absent or map to an empty list.
    async fn advisories(&self, specs: &[String]) -> Result<HashMap<String, Vec<Advisory>>>;
}
