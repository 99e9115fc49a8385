use std::collections::HashMap;

/// One result row, column name to raw text. NULL columns are empty strings.
pub type RawRow = HashMap<String, String>;

/// Metric types a query result can be exported as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    /// Case-insensitive match against the supported kinds.
    #[must_use]
    pub fn parse(kind: &str) -> Option<Self> {
        if kind.trim().eq_ignore_ascii_case("counter") {
            Some(Self::Counter)
        } else if kind.trim().eq_ignore_ascii_case("gauge") {
            Some(Self::Gauge)
        } else {
            None
        }
    }
}

/// A typed data point produced from one row.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub key: String,
    pub kind: MetricKind,
    pub value: f64,
    /// Label values in definition order, instance name last.
    pub labels: Vec<String>,
}

/// Per-instance outcome of a scrape cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScrapeStatus {
    pub instance: String,
    pub success: bool,
}

impl ScrapeStatus {
    #[must_use]
    pub fn value(&self) -> f64 {
        if self.success { 1.0 } else { 0.0 }
    }
}

/// Everything one pass over a partition produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    pub samples: Vec<Sample>,
    pub statuses: Vec<ScrapeStatus>,
}

impl Batch {
    pub fn extend(&mut self, other: Self) {
        self.samples.extend(other.samples);
        self.statuses.extend(other.statuses);
    }

    #[must_use]
    pub fn failed_instances(&self) -> usize {
        self.statuses.iter().filter(|s| !s.success).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_kind_parse() {
        assert_eq!(MetricKind::parse("counter"), Some(MetricKind::Counter));
        assert_eq!(MetricKind::parse("COUNTER"), Some(MetricKind::Counter));
        assert_eq!(MetricKind::parse("Gauge"), Some(MetricKind::Gauge));
        assert_eq!(MetricKind::parse("histogram"), None);
        assert_eq!(MetricKind::parse("guage"), None);
        assert_eq!(MetricKind::parse(""), None);
    }

    #[test]
    fn test_status_value() {
        let ok = ScrapeStatus {
            instance: "a".into(),
            success: true,
        };
        let failed = ScrapeStatus {
            instance: "b".into(),
            success: false,
        };
        assert!((ok.value() - 1.0).abs() < f64::EPSILON);
        assert!(failed.value().abs() < f64::EPSILON);
    }

    #[test]
    fn test_batch_extend() {
        let mut batch = Batch::default();
        batch.extend(Batch {
            samples: vec![],
            statuses: vec![ScrapeStatus {
                instance: "a".into(),
                success: false,
            }],
        });
        batch.extend(Batch {
            samples: vec![],
            statuses: vec![ScrapeStatus {
                instance: "b".into(),
                success: true,
            }],
        });
        assert_eq!(batch.statuses.len(), 2);
        assert_eq!(batch.failed_instances(), 1);
    }
}
