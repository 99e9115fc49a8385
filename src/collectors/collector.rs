use super::{registry::DescriptorRegistry, sample::Batch, scrape::ScrapeEngine};
use crate::config::Instance;
use prometheus::core::Desc;
use std::sync::Arc;
use tracing::{debug, instrument};

/// One partition of an endpoint's instances, scraped as a unit.
///
/// Instances inside a partition are scraped one after another; partitions of
/// the same endpoint run concurrently.
#[derive(Clone)]
pub struct PartitionCollector {
    index: usize,
    instances: Vec<Instance>,
    engine: ScrapeEngine,
    registry: Arc<DescriptorRegistry>,
}

impl PartitionCollector {
    #[must_use]
    pub fn new(
        index: usize,
        instances: Vec<Instance>,
        engine: ScrapeEngine,
        registry: Arc<DescriptorRegistry>,
    ) -> Self {
        Self {
            index,
            instances,
            engine,
            registry,
        }
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// Descriptors of everything this partition can emit. Static for the
    /// life of the process.
    #[must_use]
    pub fn describe(&self) -> Vec<&Desc> {
        self.registry.descs()
    }

    /// One full pass over the partition.
    #[instrument(
        skip(self),
        level = "info",
        fields(partition = self.index, instances = self.instances.len(), otel.kind = "internal")
    )]
    pub async fn collect(&self) -> Batch {
        let batch = self.engine.scrape(&self.instances).await;
        debug!(
            samples = batch.samples.len(),
            failed = batch.failed_instances(),
            "partition collected"
        );
        batch
    }
}
