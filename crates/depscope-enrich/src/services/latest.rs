//! Newest published version per package, cached with a computed TTL

use super::write_cache;
use crate::batch::run_batched;
use crate::source::MetaSource;
use crate::ttl::{is_fresh, latest_entry};
use chrono::{DateTime, Utc};
use depscope_core::{KvStore, KvStoreExt, NpmMetaLatest};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub struct LatestMetaService {
    source: Arc<dyn MetaSource>,
    store: Arc<dyn KvStore>,
    concurrency: usize,
}

impl LatestMetaService {
    pub const BATCH_SIZE: usize = 10;

    pub fn new(source: Arc<dyn MetaSource>, store: Arc<dyn KvStore>, concurrency: usize) -> Self {
        Self {
            source,
            store,
            concurrency,
        }
    }

    /// Latest version info keyed by package name.
    pub async fn get(&self, names: &[String]) -> HashMap<String, NpmMetaLatest> {
        self.get_at(names, Utc::now()).await
    }

    pub(crate) async fn get_at(
        &self,
        names: &[String],
        now: DateTime<Utc>,
    ) -> HashMap<String, NpmMetaLatest> {
        let mut latest = HashMap::new();
        let mut missing = Vec::new();
        for name in names.iter().collect::<BTreeSet<_>>() {
            match self.store.get_as::<NpmMetaLatest>(name) {
                Ok(Some(entry)) if is_fresh(&entry, now) => {
                    latest.insert(name.clone(), entry);
                }
                Ok(Some(_)) => {
                    tracing::debug!("Latest version of {} expired, refetching", name);
                    missing.push(name.clone());
                }
                Ok(None) => missing.push(name.clone()),
                Err(e) => {
                    tracing::debug!("Cache read failed for {}: {}", name, e);
                    missing.push(name.clone());
                }
            }
        }

        let fetched = run_batched(
            "latest versions",
            missing,
            Self::BATCH_SIZE,
            self.concurrency,
            |batch| {
                let source = Arc::clone(&self.source);
                async move { source.latest(&batch).await }
            },
        )
        .await;

        let entries: HashMap<String, NpmMetaLatest> = fetched
            .into_iter()
            .map(|(name, found)| (name, latest_entry(found.version, found.published_at, now)))
            .collect();
        write_cache(self.store.as_ref(), &entries);
        latest.extend(entries);
        latest
    }

    /// Drop expired entries from the store. Returns how many were removed.
    pub fn prune_expired(&self) -> depscope_core::Result<usize> {
        let now = Utc::now();
        let mut removed = 0;
        for key in self.store.keys()? {
            let fresh = self
                .store
                .get_as::<NpmMetaLatest>(&key)?
                .is_some_and(|entry| is_fresh(&entry, now));
            if !fresh {
                self.store.remove(&key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
