use super::registry::build_fq_name;
use crate::exporter::GIT_COMMIT_HASH;
use prometheus::{
    CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, proto::MetricFamily,
};
use std::time::Instant;
use tracing::debug;

const ENDPOINT_LABEL: &str = "endpoint";

/// Exporter self-metrics, shared by every endpoint.
///
/// All series carry an `endpoint` label so one endpoint's scrape shows the
/// stats of all of them:
///
/// - `<ns>_<sub>_scrape_duration_seconds{endpoint}` (histogram)
/// - `<ns>_<sub>_scrapes_total{endpoint}` (counter)
/// - `<ns>_<sub>_last_scrape_samples{endpoint}` (gauge)
/// - `<ns>_<sub>_last_scrape_failed_instances{endpoint}` (gauge)
/// - `<ns>_<sub>_build_info{version, commit}` (gauge, always 1)
#[derive(Clone)]
pub struct ScrapeStats {
    scrape_duration_seconds: HistogramVec,
    scrapes_total: CounterVec,
    last_scrape_samples: GaugeVec,
    last_scrape_failed_instances: GaugeVec,
    registry: Registry,
}

impl ScrapeStats {
    /// # Errors
    ///
    /// Returns an error if `namespace` or `subsystem` produce an invalid metric name.
    pub fn new(namespace: &str, subsystem: &str) -> Result<Self, prometheus::Error> {
        let name = |key: &str| build_fq_name(namespace, subsystem, key);

        let scrape_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                name("scrape_duration_seconds"),
                "Time spent scraping all instances of an endpoint in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &[ENDPOINT_LABEL],
        )?;

        let scrapes_total = CounterVec::new(
            Opts::new(name("scrapes_total"), "Total number of scrapes per endpoint"),
            &[ENDPOINT_LABEL],
        )?;

        let last_scrape_samples = GaugeVec::new(
            Opts::new(
                name("last_scrape_samples"),
                "Number of samples produced by the last scrape of an endpoint",
            ),
            &[ENDPOINT_LABEL],
        )?;

        let last_scrape_failed_instances = GaugeVec::new(
            Opts::new(
                name("last_scrape_failed_instances"),
                "Number of instances that failed during the last scrape of an endpoint",
            ),
            &[ENDPOINT_LABEL],
        )?;

        let build_info = GaugeVec::new(
            Opts::new(name("build_info"), "Exporter build information"),
            &["version", "commit"],
        )?;
        build_info
            .with_label_values(&[env!("CARGO_PKG_VERSION"), GIT_COMMIT_HASH])
            .set(1.0);

        let registry = Registry::new();
        registry.register(Box::new(scrape_duration_seconds.clone()))?;
        registry.register(Box::new(scrapes_total.clone()))?;
        registry.register(Box::new(last_scrape_samples.clone()))?;
        registry.register(Box::new(last_scrape_failed_instances.clone()))?;
        registry.register(Box::new(build_info))?;

        Ok(Self {
            scrape_duration_seconds,
            scrapes_total,
            last_scrape_samples,
            last_scrape_failed_instances,
            registry,
        })
    }

    /// Start timing one scrape of `endpoint`.
    #[must_use]
    pub fn start_scrape(&self, endpoint: &str) -> ScrapeTimer {
        ScrapeTimer {
            endpoint: endpoint.to_string(),
            start: Instant::now(),
            stats: self.clone(),
            finished: false,
        }
    }

    #[must_use]
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    fn record(&self, endpoint: &str, duration: f64) {
        self.scrape_duration_seconds
            .with_label_values(&[endpoint])
            .observe(duration);
        self.scrapes_total.with_label_values(&[endpoint]).inc();
    }
}

/// RAII timer for one endpoint scrape.
///
/// [`ScrapeTimer::finish`] records the duration and the pass results. A timer
/// dropped without finishing (the request went away mid-scrape) still counts
/// the scrape and its duration, but leaves the last-scrape gauges untouched.
pub struct ScrapeTimer {
    endpoint: String,
    start: Instant,
    stats: ScrapeStats,
    finished: bool,
}

impl ScrapeTimer {
    #[allow(clippy::cast_precision_loss)]
    pub fn finish(mut self, samples: usize, failed_instances: usize) {
        let duration = self.start.elapsed().as_secs_f64();
        self.stats.record(&self.endpoint, duration);
        self.stats
            .last_scrape_samples
            .with_label_values(&[self.endpoint.as_str()])
            .set(samples as f64);
        self.stats
            .last_scrape_failed_instances
            .with_label_values(&[self.endpoint.as_str()])
            .set(failed_instances as f64);
        self.finished = true;

        debug!(endpoint = %self.endpoint, duration, samples, failed_instances, "scrape recorded");
    }
}

impl Drop for ScrapeTimer {
    fn drop(&mut self) {
        if !self.finished {
            let duration = self.start.elapsed().as_secs_f64();
            self.stats.record(&self.endpoint, duration);
        }
    }
}
