//! Cached enrichment services
//!
//! Each service consults its store before fetching and only asks the source
//! for what is missing. Store failures degrade to cache misses.

pub mod install_size;
pub mod latest;
pub mod npm_meta;
pub mod publish_dates;
pub mod vulnerabilities;

pub use install_size::InstallSizeService;
pub use latest::LatestMetaService;
pub use npm_meta::NpmMetaService;
pub use publish_dates::PublishDates;
pub use vulnerabilities::VulnerabilityService;

use crate::batch::run_batched;
use depscope_core::{KvStore, KvStoreExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeSet, HashMap};

/// Split `keys` into cached values and the deduplicated keys still to fetch.
pub(crate) fn split_cached<T: DeserializeOwned>(
    store: &dyn KvStore,
    keys: &[String],
) -> (HashMap<String, T>, Vec<String>) {
    let mut cached = HashMap::new();
    let mut missing = Vec::new();
    for key in keys.iter().collect::<BTreeSet<_>>() {
        match store.get_as::<T>(key) {
            Ok(Some(value)) => {
                cached.insert(key.clone(), value);
            }
            Ok(None) => missing.push(key.clone()),
            Err(e) => {
                tracing::debug!("Cache read failed for {}: {}", key, e);
                missing.push(key.clone());
            }
        }
    }
    (cached, missing)
}

/// Persist fetched entries. Failed writes only cost a refetch next run.
pub(crate) fn write_cache<T: Serialize>(store: &dyn KvStore, entries: &HashMap<String, T>) {
    for (key, value) in entries {
        if let Err(e) = store.set_as(key, value) {
            tracing::warn!("Cache write failed for {}: {}", key, e);
        }
    }
}

/// Serve `keys` from `store`, fetch the rest in batches and cache what came
/// back.
pub(crate) async fn cached_batched<T, F, Fut>(
    store: &dyn KvStore,
    keys: &[String],
    label: &str,
    batch_size: usize,
    concurrency: usize,
    fetch: F,
) -> HashMap<String, T>
where
    T: Serialize + DeserializeOwned,
    F: Fn(Vec<String>) -> Fut,
    Fut: Future<Output = anyhow::Result<HashMap<String, T>>>,
{
    let (mut values, missing) = split_cached::<T>(store, keys);
    let fetched = run_batched(label, missing, batch_size, concurrency, fetch).await;
    write_cache(store, &fetched);
    values.extend(fetched);
    values
}
