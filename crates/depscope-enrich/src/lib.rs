//! Depscope Enrich: registry metadata, install sizes and resolved nodes
//!
//! Services share one shape: look in a key-value cache, fetch the misses in
//! batches from a [`MetaSource`], write back what came in. Nothing here fails
//! the run; missing data just leaves fields empty.

pub mod batch;
pub mod enricher;
pub mod providers;
pub mod resolve;
pub mod services;
pub mod size;
pub mod source;
pub mod ttl;


pub use batch::run_batched;
pub use enricher::{Enricher, STORE_NAMES};
pub use providers::{NpmRegistrySource, OfflineSource, create_source};
pub use resolve::resolve_node;
pub use services::{
    InstallSizeService, LatestMetaService, NpmMetaService, PublishDates, VulnerabilityService,
};
pub use size::{FileCategories, scan_install_size};
pub use source::{LatestVersion, MetaSource};
pub use ttl::latest_ttl;
