use super::ConfigError;
use serde::Deserialize;
use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
    time::Duration,
};

/// One metric fed by a query's result columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricDefinition {
    pub key: String,
    /// Raw kind as written in the config, matched case-insensitively when rows are mapped.
    pub kind: String,
    pub help: String,
    pub labels: Vec<String>,
    pub value: String,
}

impl MetricDefinition {
    #[must_use]
    pub fn new(key: impl Into<String>, kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: kind.into(),
            help: String::new(),
            labels: Vec::new(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    #[must_use]
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }
}

/// A query and the metrics mapped from its rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectDefinition {
    pub query: String,
    /// `None` means the process default query timeout applies.
    pub timeout: Option<Duration>,
    pub metrics: Vec<MetricDefinition>,
}

impl CollectDefinition {
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            timeout: None,
            metrics: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_metric(mut self, metric: MetricDefinition) -> Self {
        self.metrics.push(metric);
        self
    }
}

/// An HTTP endpoint: the groups it scrapes and the queries it runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointConfig {
    pub path: String,
    pub targets: Vec<String>,
    pub collects: Vec<CollectDefinition>,
}

#[derive(Debug, Deserialize)]
struct RawEndpoint {
    #[serde(default)]
    targets: Vec<String>,
    #[serde(default)]
    collects: Vec<RawCollect>,
}

#[derive(Debug, Deserialize)]
struct RawCollect {
    query: String,
    /// Seconds; zero or negative falls back to the query timeout.
    #[serde(default)]
    timeout: Option<i64>,
    #[serde(default)]
    metrics: BTreeMap<String, RawMetric>,
}

#[derive(Debug, Deserialize)]
struct RawMetric {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    labels: Vec<String>,
    value: String,
}

/// Converts a configured timeout in seconds; non-positive values mean "use the default".
#[must_use]
pub fn timeout_from_secs(secs: Option<i64>) -> Option<Duration> {
    secs.and_then(|s| u64::try_from(s).ok())
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
}

/// Parse the endpoints document.
///
/// # Errors
///
/// Returns an error on invalid YAML, an invalid path, an empty query or an
/// empty value column.
pub fn parse_endpoints(yaml: &str, path: &Path) -> Result<Vec<EndpointConfig>, ConfigError> {
    let raw: BTreeMap<String, RawEndpoint> =
        serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|(name, endpoint)| {
            let endpoint = resolve_endpoint(name, endpoint)?;
            if seen.insert(endpoint.path.clone()) {
                Ok(endpoint)
            } else {
                Err(ConfigError::DuplicateEndpoint(endpoint.path))
            }
        })
        .collect()
}

fn resolve_endpoint(name: String, raw: RawEndpoint) -> Result<EndpointConfig, ConfigError> {
    let path = normalize_path(&name)?;

    let collects = raw
        .collects
        .into_iter()
        .enumerate()
        .map(|(index, collect)| {
            if collect.query.trim().is_empty() {
                return Err(ConfigError::EmptyQuery {
                    endpoint: path.clone(),
                    index,
                });
            }

            let metrics = collect
                .metrics
                .into_iter()
                .map(|(key, m)| {
                    if m.value.trim().is_empty() {
                        return Err(ConfigError::EmptyValueColumn { key });
                    }
                    Ok(MetricDefinition {
                        key,
                        kind: m.kind,
                        help: m.description,
                        labels: m.labels,
                        value: m.value,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            Ok(CollectDefinition {
                query: collect.query,
                timeout: timeout_from_secs(collect.timeout),
                metrics,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(EndpointConfig {
        path,
        targets: raw.targets,
        collects,
    })
}

/// Endpoint names map to `/<name>`; `health` is taken by the health check.
fn normalize_path(name: &str) -> Result<String, ConfigError> {
    let trimmed = name.trim().trim_matches('/');

    let valid = !trimmed.is_empty()
        && trimmed != "health"
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/'))
        && !trimmed.contains("//");

    if valid {
        Ok(trimmed.to_string())
    } else {
        Err(ConfigError::InvalidEndpointPath(name.to_string()))
    }
}
