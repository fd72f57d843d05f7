//! A source that never touches the network

use crate::source::{LatestVersion, MetaSource};
use anyhow::Result;
use depscope_core::{Advisory, NpmMeta};
use std::collections::HashMap;

/// Answers every lookup with nothing, so only cached data is used.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineSource;

#[async_trait::async_trait]
impl MetaSource for OfflineSource {
    async fn publish_dates(&self, _specs: &[String]) -> Result<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    async fn npm_meta(&self, _specs: &[String]) -> Result<HashMap<String, NpmMeta>> {
        Ok(HashMap::new())
    }

    async fn latest(&self, _names: &[String]) -> Result<HashMap<String, LatestVersion>> {
        Ok(HashMap::new())
    }

    async fn advisories(&self, _specs: &[String]) -> Result<HashMap<String, Vec<Advisory>>> {
        Ok(HashMap::new())
    }
}
