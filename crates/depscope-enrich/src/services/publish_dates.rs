//! Publish time of exact versions

use super::cached_batched;
use crate::source::MetaSource;
use depscope_core::KvStore;
use std::collections::HashMap;
use std::sync::Arc;

pub struct PublishDates {
    source: Arc<dyn MetaSource>,
    store: Arc<dyn KvStore>,
    concurrency: usize,
}

impl PublishDates {
    pub const BATCH_SIZE: usize = 5;

    pub fn new(source: Arc<dyn MetaSource>, store: Arc<dyn KvStore>, concurrency: usize) -> Self {
        Self {
            source,
            store,
            concurrency,
        }
    }

    /// RFC 3339 publish times keyed by spec. Specs the registry doesn't know
    /// are absent.
    pub async fn get(&self, specs: &[String]) -> HashMap<String, String> {
        cached_batched(
            self.store.as_ref(),
            specs,
            "publish dates",
            Self::BATCH_SIZE,
            self.concurrency,
            |batch| {
                let source = Arc::clone(&self.source);
                async move { source.publish_dates(&batch).await }
            },
        )
        .await
    }
}
