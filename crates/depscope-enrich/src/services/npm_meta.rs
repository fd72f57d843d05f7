//! Registry metadata of exact versions

use super::cached_batched;
use crate::source::MetaSource;
use depscope_core::{KvStore, NpmMeta};
use std::collections::HashMap;
use std::sync::Arc;

pub struct NpmMetaService {
    source: Arc<dyn MetaSource>,
    store: Arc<dyn KvStore>,
    concurrency: usize,
}

impl NpmMetaService {
    pub const BATCH_SIZE: usize = 10;

    pub fn new(source: Arc<dyn MetaSource>, store: Arc<dyn KvStore>, concurrency: usize) -> Self {
        Self {
            source,
            store,
            concurrency,
        }
    }

    pub async fn get(&self, specs: &[String]) -> HashMap<String, NpmMeta> {
        cached_batched(
            self.store.as_ref(),
            specs,
            "npm metadata",
            Self::BATCH_SIZE,
            self.concurrency,
            |batch| {
                let source = Arc::clone(&self.source);
                async move { source.npm_meta(&batch).await }
            },
        )
        .await
    }
}
