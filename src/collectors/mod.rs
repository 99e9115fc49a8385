//! Turning configured SQL queries into Prometheus metrics.
//!
//! Each endpoint owns a [`registry::DescriptorRegistry`] built once from its
//! collects, and a set of [`collector::PartitionCollector`]s produced by
//! [`partition::partition`]. A scrape of the endpoint runs every partition
//! concurrently through the [`scrape::ScrapeEngine`], maps rows with
//! [`mapper::map_row`] and renders the batch into fresh metric vectors.

use crate::config::ExporterConfig;
use anyhow::{Context, Result};
use std::{num::NonZeroUsize, sync::Arc};
use tracing::info;

pub mod backend;
pub mod collector;
pub mod endpoint;
pub mod mapper;
pub mod partition;
pub mod registry;
pub mod sample;
pub mod scrape;
pub mod stats;

pub use backend::Connectors;
pub use endpoint::{Endpoint, encode, render};
pub use sample::{Batch, MetricKind, RawRow, Sample, ScrapeStatus};
pub use scrape::{ScrapeEngine, ScrapeError, ScrapeSettings};
pub use stats::ScrapeStats;

/// Process-wide knobs shared by every endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExporterSettings {
    pub namespace: String,
    pub subsystem: String,
    /// Partitions per endpoint.
    pub partitions: NonZeroUsize,
    pub scrape: ScrapeSettings,
}

impl Default for ExporterSettings {
    fn default() -> Self {
        Self {
            namespace: registry::DEFAULT_NAMESPACE.to_string(),
            subsystem: registry::DEFAULT_SUBSYSTEM.to_string(),
            partitions: partition::DEFAULT_PARTITIONS,
            scrape: ScrapeSettings::default(),
        }
    }
}

/// Build every configured endpoint, sharing one set of self-metrics.
///
/// # Errors
///
/// Returns an error if any endpoint's configuration is invalid.
pub fn build_endpoints(
    config: &ExporterConfig,
    settings: &ExporterSettings,
    connectors: Connectors,
) -> Result<Vec<Arc<Endpoint>>> {
    let stats = ScrapeStats::new(&settings.namespace, &settings.subsystem)
        .context("invalid namespace or subsystem")?;
    let connectors = Arc::new(connectors);

    config
        .endpoints
        .iter()
        .map(|endpoint| -> Result<Arc<Endpoint>> {
            let built = Endpoint::build(
                endpoint,
                &config.groups,
                &connectors,
                stats.clone(),
                settings,
            )?;
            info!(
                endpoint = %built.name(),
                instances = built.instance_count(),
                metrics = built.registry().len(),
                "endpoint ready"
            );
            Ok(Arc::new(built))
        })
        .collect()
}
