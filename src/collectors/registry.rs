use crate::config::{CollectDefinition, ConfigError, MetricDefinition};
use prometheus::{Opts, core::Desc};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Label appended to every metric, carrying the instance name.
pub const INSTANCE_LABEL: &str = "instance";

pub const DEFAULT_NAMESPACE: &str = "query";
pub const DEFAULT_SUBSYSTEM: &str = "exporter";

/// Keys of the exporter's own metrics; user metrics may not shadow them.
pub const RESERVED_KEYS: &[&str] = &[
    "status",
    "build_info",
    "scrape_duration_seconds",
    "scrapes_total",
    "last_scrape_samples",
    "last_scrape_failed_instances",
];

/// Joins the non-empty parts with `_`, like the Go client's `BuildFQName`.
#[must_use]
pub fn build_fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }

    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

/// Identity of one exported metric: name and label schema.
#[derive(Clone, Debug)]
pub struct MetricDescriptor {
    pub key: String,
    pub fq_name: String,
    pub help: String,
    /// Configured label names followed by `instance`.
    pub labels: Vec<String>,
    kind: String,
    desc: Desc,
}

impl MetricDescriptor {
    fn new(
        key: &str,
        fq_name: String,
        help: String,
        labels: Vec<String>,
        kind: String,
    ) -> Result<Self, ConfigError> {
        let desc = Desc::new(fq_name.clone(), help.clone(), labels.clone(), HashMap::new())
            .map_err(|source| ConfigError::InvalidDescriptor {
                key: key.to_string(),
                source,
            })?;

        Ok(Self {
            key: key.to_string(),
            fq_name,
            help,
            labels,
            kind,
            desc,
        })
    }

    #[must_use]
    pub const fn desc(&self) -> &Desc {
        &self.desc
    }

    /// Options for building a metric vector matching this descriptor.
    #[must_use]
    pub fn opts(&self) -> Opts {
        Opts::new(self.fq_name.clone(), self.help.clone())
    }

    #[must_use]
    pub fn label_names(&self) -> Vec<&str> {
        self.labels.iter().map(String::as_str).collect()
    }
}

/// Immutable side table of metric descriptors for one endpoint, keyed by metric key.
///
/// Built once at startup and shared read-only by every partition.
#[derive(Clone, Debug)]
pub struct DescriptorRegistry {
    namespace: String,
    subsystem: String,
    metrics: BTreeMap<String, MetricDescriptor>,
    status: MetricDescriptor,
}

impl DescriptorRegistry {
    /// Build one descriptor per metric key found in `collects`.
    ///
    /// The same key may appear in several collects as long as label set and
    /// kind agree; the first definition's help text wins.
    ///
    /// # Errors
    ///
    /// Returns an error for conflicting definitions of a key, reserved or
    /// duplicate labels, reserved keys, or names the prometheus crate rejects.
    pub fn build(
        namespace: &str,
        subsystem: &str,
        collects: &[CollectDefinition],
    ) -> Result<Self, ConfigError> {
        let mut metrics: BTreeMap<String, MetricDescriptor> = BTreeMap::new();

        for metric in collects.iter().flat_map(|c| c.metrics.iter()) {
            validate_definition(metric)?;

            let mut labels = metric.labels.clone();
            labels.push(INSTANCE_LABEL.to_string());
            let kind = metric.kind.trim().to_ascii_lowercase();

            if let Some(existing) = metrics.get(&metric.key) {
                if existing.labels != labels {
                    return Err(ConfigError::DescriptorConflict {
                        key: metric.key.clone(),
                        what: "label sets",
                    });
                }
                if existing.kind != kind {
                    return Err(ConfigError::DescriptorConflict {
                        key: metric.key.clone(),
                        what: "types",
                    });
                }
                continue;
            }

            let fq_name = build_fq_name(namespace, subsystem, &metric.key);
            let help = if metric.help.trim().is_empty() {
                format!("Query result column '{}'", metric.value)
            } else {
                metric.help.clone()
            };

            let descriptor = MetricDescriptor::new(&metric.key, fq_name, help, labels, kind)?;
            debug!(
                key = %metric.key,
                fq_name = %descriptor.fq_name,
                labels = ?descriptor.labels,
                "metric descriptor registered"
            );
            metrics.insert(metric.key.clone(), descriptor);
        }

        let status = MetricDescriptor::new(
            "status",
            build_fq_name(namespace, subsystem, "status"),
            "Query collect status".to_string(),
            vec![INSTANCE_LABEL.to_string()],
            "gauge".to_string(),
        )?;

        Ok(Self {
            namespace: namespace.to_string(),
            subsystem: subsystem.to_string(),
            metrics,
            status,
        })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MetricDescriptor> {
        self.metrics.get(key)
    }

    #[must_use]
    pub const fn status(&self) -> &MetricDescriptor {
        &self.status
    }

    /// Fully-qualified name for an exporter-owned metric key.
    #[must_use]
    pub fn fq_name(&self, key: &str) -> String {
        build_fq_name(&self.namespace, &self.subsystem, key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Every descriptor, status last.
    pub fn descriptors(&self) -> impl Iterator<Item = &MetricDescriptor> {
        self.metrics.values().chain(std::iter::once(&self.status))
    }

    #[must_use]
    pub fn descs(&self) -> Vec<&Desc> {
        self.descriptors().map(MetricDescriptor::desc).collect()
    }
}

fn validate_definition(metric: &MetricDefinition) -> Result<(), ConfigError> {
    if RESERVED_KEYS.contains(&metric.key.as_str()) {
        return Err(ConfigError::ReservedKey {
            key: metric.key.clone(),
        });
    }

    let mut seen = HashSet::new();
    for label in &metric.labels {
        if label == INSTANCE_LABEL {
            return Err(ConfigError::ReservedLabel {
                key: metric.key.clone(),
                label: label.clone(),
            });
        }
        if !seen.insert(label.as_str()) {
            return Err(ConfigError::DuplicateLabel {
                key: metric.key.clone(),
                label: label.clone(),
            });
        }
    }

    Ok(())
}
