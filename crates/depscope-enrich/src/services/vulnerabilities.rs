//! Security advisories per exact version

use super::cached_batched;
use crate::source::MetaSource;
use depscope_core::{Advisory, KvStore};
use std::collections::HashMap;
use std::sync::Arc;

pub struct VulnerabilityService {
    source: Arc<dyn MetaSource>,
    store: Arc<dyn KvStore>,
    concurrency: usize,
}

impl VulnerabilityService {
    pub const BATCH_SIZE: usize = 100;

    pub fn new(source: Arc<dyn MetaSource>, store: Arc<dyn KvStore>, concurrency: usize) -> Self {
        Self {
            source,
            store,
            concurrency,
        }
    }

    /// Advisories per spec. A spec mapped to an empty list was checked and is
    /// clean; an absent spec could not be checked.
    pub async fn get(&self, specs: &[String]) -> HashMap<String, Vec<Advisory>> {
        cached_batched(
            self.store.as_ref(),
            specs,
            "advisories",
            Self::BATCH_SIZE,
            self.concurrency,
            |batch| {
                let source = Arc::clone(&self.source);
                async move { source.advisories(&batch).await }
            },
        )
        .await
    }
}
