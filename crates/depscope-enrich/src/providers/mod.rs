//! Metadata source implementations

pub mod npm_registry;
pub mod offline;

use crate::source::MetaSource;
use depscope_core::Config;
use std::sync::Arc;

pub use npm_registry::NpmRegistrySource;
pub use offline::OfflineSource;

/// Pick the metadata source for a configuration.
pub fn create_source(config: &Config) -> Arc<dyn MetaSource> {
    if config.offline {
        tracing::info!("Offline mode: using cached metadata only");
        Arc::new(OfflineSource)
    } else {
        Arc::new(NpmRegistrySource::new(&config.registry, &config.meta_api))
    }
}
