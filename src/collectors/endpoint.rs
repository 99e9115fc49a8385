use super::{
    ExporterSettings,
    backend::Connectors,
    collector::PartitionCollector,
    partition::partition,
    registry::DescriptorRegistry,
    sample::{Batch, MetricKind, Sample},
    scrape::ScrapeEngine,
    stats::ScrapeStats,
};
use crate::config::{ConfigError, EndpointConfig, InstanceGroups};
use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use prometheus::{
    CounterVec, Encoder, GaugeVec, Registry, TextEncoder, core::Desc, proto::MetricFamily,
};
use std::{
    collections::{HashMap, HashSet, hash_map::Entry},
    sync::Arc,
};
use tracing::{debug, info_span, instrument, warn};
use tracing_futures::Instrument as _;

/// One HTTP metrics endpoint: its descriptors and the partitions it scrapes.
pub struct Endpoint {
    name: String,
    partitions: Vec<PartitionCollector>,
    registry: Arc<DescriptorRegistry>,
    stats: ScrapeStats,
}

impl Endpoint {
    /// # Errors
    ///
    /// Returns an error if the endpoint's metric definitions conflict or its
    /// targets do not resolve to distinct instances.
    pub fn build(
        config: &EndpointConfig,
        groups: &InstanceGroups,
        connectors: &Arc<Connectors>,
        stats: ScrapeStats,
        settings: &ExporterSettings,
    ) -> Result<Self, ConfigError> {
        let registry = Arc::new(DescriptorRegistry::build(
            &settings.namespace,
            &settings.subsystem,
            &config.collects,
        )?);

        let parts = partition(&config.path, groups, &config.targets, settings.partitions)?;

        let mut unsupported = HashSet::new();
        for instance in parts.iter().flatten() {
            if !connectors.supports(instance.backend) && unsupported.insert(instance.backend) {
                warn!(
                    endpoint = %config.path,
                    backend = %instance.backend,
                    "no connector for backend, its instances will always report status 0"
                );
            }
        }

        let engine = ScrapeEngine::new(
            Arc::clone(connectors),
            config.collects.clone().into(),
            settings.scrape,
        );

        let partitions: Vec<PartitionCollector> = parts
            .into_iter()
            .enumerate()
            .filter(|(_, instances)| !instances.is_empty())
            .map(|(index, instances)| {
                PartitionCollector::new(index, instances, engine.clone(), Arc::clone(&registry))
            })
            .collect();

        debug!(
            endpoint = %config.path,
            metrics = registry.len(),
            partitions = partitions.len(),
            "endpoint built"
        );

        Ok(Self {
            name: config.path.clone(),
            partitions,
            registry,
            stats,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.partitions.iter().map(|p| p.instances().len()).sum()
    }

    #[must_use]
    pub fn registry(&self) -> &DescriptorRegistry {
        &self.registry
    }

    #[must_use]
    pub fn describe(&self) -> Vec<&Desc> {
        self.registry.descs()
    }

    /// Scrape every partition concurrently and merge the results.
    pub async fn collect(&self) -> Batch {
        let mut tasks = FuturesUnordered::new();

        for p in &self.partitions {
            let span = info_span!(
                "endpoint.partition",
                partition = p.index(),
                otel.kind = "internal"
            );
            tasks.push(p.collect().instrument(span));
        }

        let mut batch = Batch::default();
        while let Some(part) = tasks.next().await {
            batch.extend(part);
        }

        batch
    }

    /// Run one scrape cycle and return the endpoint's metric families
    /// followed by the exporter's own metrics.
    ///
    /// # Errors
    ///
    /// Returns an error if the per-cycle metric vectors cannot be built.
    #[instrument(skip(self), level = "info", fields(endpoint = %self.name, otel.kind = "internal"))]
    pub async fn gather(&self) -> Result<Vec<MetricFamily>> {
        let timer = self.stats.start_scrape(&self.name);

        let batch = self.collect().await;
        let rendered = render(&self.registry, &batch)?;
        timer.finish(batch.samples.len(), batch.failed_instances());

        let mut families = rendered.gather();
        families.extend(self.stats.gather());

        Ok(families)
    }
}

/// Record the label set of `sample`, returning true if an earlier sample of
/// this cycle already set it.
fn overwrites<'a>(seen: &mut HashSet<(&'a str, &'a [String])>, sample: &'a Sample) -> bool {
    let duplicate = !seen.insert((sample.key.as_str(), sample.labels.as_slice()));
    if duplicate {
        debug!(
            metric = %sample.key,
            labels = ?sample.labels,
            "duplicate label set, replacing earlier value"
        );
    }
    duplicate
}

/// Render a batch into a fresh registry.
///
/// Metric vectors are created per cycle, so label sets that disappear from
/// the database disappear from the output. Within a cycle the last sample for
/// a label set wins.
///
/// # Errors
///
/// Returns an error if a metric vector cannot be created or registered.
pub fn render(registry: &DescriptorRegistry, batch: &Batch) -> Result<Registry, prometheus::Error> {
    let out = Registry::new();
    let mut counters: HashMap<&str, CounterVec> = HashMap::new();
    let mut gauges: HashMap<&str, GaugeVec> = HashMap::new();
    let mut seen = HashSet::new();

    for sample in &batch.samples {
        let Some(descriptor) = registry.get(&sample.key) else {
            warn!(metric = %sample.key, "sample without descriptor, dropping");
            continue;
        };
        let labels: Vec<&str> = sample.labels.iter().map(String::as_str).collect();

        match sample.kind {
            MetricKind::Counter => {
                if sample.value.is_nan() || sample.value < 0.0 {
                    warn!(
                        metric = %sample.key,
                        value = sample.value,
                        ?labels,
                        "counter value must be a non-negative number, dropping"
                    );
                    continue;
                }

                overwrites(&mut seen, sample);
                let vec = match counters.entry(sample.key.as_str()) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => {
                        let vec = CounterVec::new(descriptor.opts(), &descriptor.label_names())?;
                        out.register(Box::new(vec.clone()))?;
                        e.insert(vec)
                    }
                };

                match vec.get_metric_with_label_values(&labels) {
                    Ok(counter) => {
                        counter.reset();
                        counter.inc_by(sample.value);
                    }
                    Err(e) => warn!(metric = %sample.key, error = %e, "dropping sample"),
                }
            }
            MetricKind::Gauge => {
                overwrites(&mut seen, sample);
                let vec = match gauges.entry(sample.key.as_str()) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => {
                        let vec = GaugeVec::new(descriptor.opts(), &descriptor.label_names())?;
                        out.register(Box::new(vec.clone()))?;
                        e.insert(vec)
                    }
                };

                match vec.get_metric_with_label_values(&labels) {
                    Ok(gauge) => gauge.set(sample.value),
                    Err(e) => warn!(metric = %sample.key, error = %e, "dropping sample"),
                }
            }
        }
    }

    let status = registry.status();
    let statuses = GaugeVec::new(status.opts(), &status.label_names())?;
    out.register(Box::new(statuses.clone()))?;
    for s in &batch.statuses {
        statuses.with_label_values(&[s.instance.as_str()]).set(s.value());
    }

    Ok(out)
}

/// Encode metric families in the Prometheus text format.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn encode(families: &[MetricFamily]) -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
