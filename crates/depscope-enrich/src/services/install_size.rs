//! Install-size summaries, computed locally and cached per spec

use super::{split_cached, write_cache};
use crate::size::FileCategories;
use depscope_core::{InstallSize, KvStore};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

pub struct InstallSizeService {
    store: Arc<dyn KvStore>,
    categories: Arc<FileCategories>,
}

impl InstallSizeService {
    pub fn new(store: Arc<dyn KvStore>) -> anyhow::Result<Self> {
        Ok(Self {
            store,
            categories: Arc::new(FileCategories::new()?),
        })
    }

    /// Sizes keyed by spec for `(spec, install dir)` pairs. Packages whose
    /// directory cannot be scanned are absent.
    pub async fn get(&self, packages: &[(String, PathBuf)]) -> HashMap<String, InstallSize> {
        let specs: Vec<String> = packages.iter().map(|(spec, _)| spec.clone()).collect();
        let (mut sizes, missing) = split_cached::<InstallSize>(self.store.as_ref(), &specs);
        if missing.is_empty() {
            return sizes;
        }

        let dirs: HashMap<&String, &PathBuf> = packages.iter().map(|(s, d)| (s, d)).collect();
        let jobs: Vec<(String, PathBuf)> = missing
            .into_iter()
            .filter_map(|spec| {
                let dir = (*dirs.get(&spec)?).clone();
                Some((spec, dir))
            })
            .collect();

        let categories = Arc::clone(&self.categories);
        let scanned = tokio::task::spawn_blocking(move || {
            jobs.par_iter()
                .filter_map(|(spec, dir)| match categories.scan(dir) {
                    Ok(size) => Some((spec.clone(), size)),
                    Err(e) => {
                        tracing::debug!("Skipping size of {}: {:#}", spec, e);
                        None
                    }
                })
                .collect::<HashMap<_, _>>()
        })
        .await;

        match scanned {
            Ok(scanned) => {
                write_cache(self.store.as_ref(), &scanned);
                sizes.extend(scanned);
            }
            Err(e) => tracing::warn!("Install size scan aborted: {}", e),
        }
        sizes
    }
}
