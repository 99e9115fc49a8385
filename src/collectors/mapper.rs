use super::sample::{MetricKind, RawRow, Sample};
use crate::config::MetricDefinition;
use tracing::{debug, trace};

/// Turn one result row into a sample for `metric`.
///
/// Never fails: missing label columns become empty label values, a missing
/// or non-numeric value column becomes `0.0`, and an unsupported metric type
/// yields `None`.
#[must_use]
pub fn map_row(row: &RawRow, instance: &str, metric: &MetricDefinition) -> Option<Sample> {
    let Some(kind) = MetricKind::parse(&metric.kind) else {
        debug!(
            instance,
            metric = %metric.key,
            kind = %metric.kind,
            "metric type must be counter or gauge, skipping"
        );
        return None;
    };

    let mut labels: Vec<String> = metric
        .labels
        .iter()
        .map(|label| row.get(label).cloned().unwrap_or_default())
        .collect();
    labels.push(instance.to_string());

    let value = parse_value(row.get(&metric.value).map(String::as_str));
    trace!(instance, metric = %metric.key, ?labels, value, "mapped row");

    Some(Sample {
        key: metric.key.clone(),
        kind,
        value,
        labels,
    })
}

/// Parses a column as `f64`, falling back to `0.0`.
#[must_use]
pub fn parse_value(raw: Option<&str>) -> f64 {
    raw.and_then(|v| v.trim().parse::<f64>().ok()).unwrap_or(0.0)
}
