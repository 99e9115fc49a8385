use super::{
    backend::{Connection, Connectors},
    mapper::map_row,
    sample::{Batch, Sample, ScrapeStatus},
};
use crate::config::{BackendType, CollectDefinition, Instance};
use futures::StreamExt;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info_span, instrument, warn};
use tracing_futures::Instrument as _;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(1);

/// Why part of an instance scrape failed. Logged, never returned to callers
/// of [`ScrapeEngine::scrape`].
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("no connector for backend {0}")]
    UnsupportedBackend(BackendType),

    #[error("connect failed: {0:#}")]
    Connect(#[source] anyhow::Error),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("health check failed: {0:#}")]
    HealthCheck(#[source] anyhow::Error),

    #[error("health check timed out after {0:?}")]
    HealthCheckTimeout(Duration),

    #[error("query failed: {0:#}")]
    QueryExecution(#[source] anyhow::Error),

    #[error("reading row failed: {0:#}")]
    RowScan(#[source] anyhow::Error),

    #[error("query timed out after {0:?}")]
    QueryTimeout(Duration),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScrapeSettings {
    /// Upper bound for opening a connection.
    pub connect_timeout: Duration,
    /// Bound for the health check and for queries without their own timeout.
    pub query_timeout: Duration,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

/// Runs an endpoint's collects against database instances.
///
/// Every instance gets exactly one [`ScrapeStatus`]: success when the
/// connection opened and answered the health check. Failing queries only
/// lose their own samples.
#[derive(Clone)]
pub struct ScrapeEngine {
    connectors: Arc<Connectors>,
    collects: Arc<[CollectDefinition]>,
    settings: ScrapeSettings,
}

impl ScrapeEngine {
    #[must_use]
    pub fn new(
        connectors: Arc<Connectors>,
        collects: Arc<[CollectDefinition]>,
        settings: ScrapeSettings,
    ) -> Self {
        Self {
            connectors,
            collects,
            settings,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> ScrapeSettings {
        self.settings
    }

    /// Scrape `instances` one after another, in order.
    pub async fn scrape(&self, instances: &[Instance]) -> Batch {
        let mut batch = Batch::default();

        for instance in instances {
            let (samples, status) = self.scrape_instance(instance).await;
            batch.samples.extend(samples);
            batch.statuses.push(status);
        }

        batch
    }

    #[instrument(
        skip(self, instance),
        level = "info",
        fields(instance = %instance.name, backend = %instance.backend, otel.kind = "internal")
    )]
    pub async fn scrape_instance(&self, instance: &Instance) -> (Vec<Sample>, ScrapeStatus) {
        let mut samples = Vec::new();

        let success = match self.open(instance).await {
            Ok(mut conn) => match self.health_check(conn.as_mut()).await {
                Ok(()) => {
                    if let Some(conn) = self.run_collects(conn, instance, &mut samples).await {
                        self.close(conn).await;
                    }
                    true
                }
                Err(e) => {
                    warn!(error = %e, "instance failed health check");
                    self.close(conn).await;
                    false
                }
            },
            Err(e) => {
                warn!(error = %e, "could not connect to instance");
                false
            }
        };

        debug!(success, samples = samples.len(), "instance scraped");

        (
            samples,
            ScrapeStatus {
                instance: instance.name.clone(),
                success,
            },
        )
    }

    async fn open(&self, instance: &Instance) -> Result<Box<dyn Connection>, ScrapeError> {
        let connector = self
            .connectors
            .get(instance.backend)
            .ok_or(ScrapeError::UnsupportedBackend(instance.backend))?;

        match timeout(self.settings.connect_timeout, connector.connect(instance)).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(ScrapeError::Connect(e)),
            Err(_) => Err(ScrapeError::ConnectTimeout(self.settings.connect_timeout)),
        }
    }

    async fn health_check(&self, conn: &mut dyn Connection) -> Result<(), ScrapeError> {
        match timeout(self.settings.query_timeout, conn.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ScrapeError::HealthCheck(e)),
            Err(_) => Err(ScrapeError::HealthCheckTimeout(self.settings.query_timeout)),
        }
    }

    /// Run every collect in order on `conn`.
    ///
    /// A timed-out statement may still be running on the backend, so the
    /// connection is interrupted and dropped, and the next collect gets a
    /// fresh one. Returns the connection left open, if any.
    async fn run_collects(
        &self,
        conn: Box<dyn Connection>,
        instance: &Instance,
        samples: &mut Vec<Sample>,
    ) -> Option<Box<dyn Connection>> {
        let mut current = Some(conn);

        for (index, collect) in self.collects.iter().enumerate() {
            let mut conn = match current.take() {
                Some(conn) => conn,
                None => match self.open(instance).await {
                    Ok(conn) => {
                        debug!(collect = index, "reconnected after query timeout");
                        conn
                    }
                    Err(e) => {
                        warn!(
                            collect = index,
                            error = %e,
                            "reconnect failed, skipping remaining queries"
                        );
                        return None;
                    }
                },
            };

            let limit = collect.timeout.unwrap_or(self.settings.query_timeout);
            let span = info_span!("db.query", otel.kind = "client", collect = index);

            let result = match timeout(
                limit,
                run_query(conn.as_mut(), &instance.name, collect, samples),
            )
            .instrument(span)
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ScrapeError::QueryTimeout(limit)),
            };

            match result {
                Ok(()) => current = Some(conn),
                Err(e @ ScrapeError::QueryTimeout(_)) => {
                    warn!(
                        collect = index,
                        query = %collect.query,
                        error = %e,
                        "query aborted, dropping connection"
                    );
                    conn.interrupt();
                }
                Err(e) => {
                    warn!(collect = index, query = %collect.query, error = %e, "query skipped");
                    current = Some(conn);
                }
            }
        }

        current
    }

    async fn close(&self, conn: Box<dyn Connection>) {
        match timeout(self.settings.query_timeout, conn.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "closing connection failed"),
            Err(_) => debug!("closing connection timed out"),
        }
    }
}

/// Stream the rows of one collect, pushing a sample per row and metric as
/// they arrive so a later failure keeps what was already read.
async fn run_query(
    conn: &mut dyn Connection,
    instance: &str,
    collect: &CollectDefinition,
    samples: &mut Vec<Sample>,
) -> Result<(), ScrapeError> {
    let mut rows = conn.query(&collect.query);
    let mut read = 0usize;

    while let Some(row) = rows.next().await {
        let row = row.map_err(|e| {
            if read == 0 {
                ScrapeError::QueryExecution(e)
            } else {
                ScrapeError::RowScan(e)
            }
        })?;
        read += 1;

        samples.extend(
            collect
                .metrics
                .iter()
                .filter_map(|metric| map_row(&row, instance, metric)),
        );
    }

    debug!(rows = read, "query finished");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::collectors::{RawRow, backend::Connector, sample::MetricKind};
    use crate::config::MetricDefinition;
    use anyhow::{Result, anyhow};
    use futures::{
        future::BoxFuture,
        stream::{self, BoxStream},
    };
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
    };

    #[derive(Clone, Copy)]
    enum Reply {
        Rows(&'static [&'static [(&'static str, &'static str)]]),
        Fail,
        FailAfter(&'static [&'static [(&'static str, &'static str)]]),
        Hang(&'static [&'static [(&'static str, &'static str)]]),
    }

    #[derive(Clone, Copy)]
    enum Behavior {
        Healthy,
        RefuseConnect,
        HangConnect,
        FailPing,
        RefuseReconnect,
    }

    #[derive(Clone)]
    struct FakeConnector {
        behavior: HashMap<String, Behavior>,
        replies: HashMap<&'static str, Reply>,
        connects: Arc<AtomicUsize>,
        interrupted: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    impl FakeConnector {
        fn new(replies: &[(&'static str, Reply)]) -> Self {
            Self {
                behavior: HashMap::new(),
                replies: replies.iter().copied().collect(),
                connects: Arc::new(AtomicUsize::new(0)),
                interrupted: Arc::new(AtomicUsize::new(0)),
                closed: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn with(mut self, instance: &str, behavior: Behavior) -> Self {
            self.behavior.insert(instance.to_string(), behavior);
            self
        }
    }

    impl Connector for FakeConnector {
        fn connect<'a>(
            &'a self,
            instance: &'a Instance,
        ) -> BoxFuture<'a, Result<Box<dyn Connection>>> {
            let behavior = self
                .behavior
                .get(&instance.name)
                .copied()
                .unwrap_or(Behavior::Healthy);
            let attempt = self.connects.fetch_add(1, Ordering::SeqCst);

            Box::pin(async move {
                match behavior {
                    Behavior::RefuseConnect => Err(anyhow!("connection refused")),
                    Behavior::RefuseReconnect if attempt > 0 => {
                        Err(anyhow!("too many connections"))
                    }
                    Behavior::HangConnect => futures::future::pending().await,
                    Behavior::Healthy | Behavior::FailPing | Behavior::RefuseReconnect => {
                        Ok(Box::new(FakeConnection {
                            fail_ping: matches!(behavior, Behavior::FailPing),
                            replies: self.replies.clone(),
                            interrupted: Arc::clone(&self.interrupted),
                            closed: Arc::clone(&self.closed),
                        }) as Box<dyn Connection>)
                    }
                }
            })
        }
    }

    struct FakeConnection {
        fail_ping: bool,
        replies: HashMap<&'static str, Reply>,
        interrupted: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    fn to_rows(rows: &[&[(&str, &str)]]) -> Vec<Result<RawRow>> {
        rows.iter()
            .map(|row| {
                Ok(row
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect())
            })
            .collect()
    }

    impl Connection for FakeConnection {
        fn ping(&mut self) -> BoxFuture<'_, Result<()>> {
            let fail = self.fail_ping;
            Box::pin(async move {
                if fail {
                    Err(anyhow!("server closed the connection"))
                } else {
                    Ok(())
                }
            })
        }

        fn query<'a>(&'a mut self, sql: &'a str) -> BoxStream<'a, Result<RawRow>> {
            match self.replies.get(sql).copied() {
                Some(Reply::Rows(rows)) => stream::iter(to_rows(rows)).boxed(),
                Some(Reply::FailAfter(rows)) => stream::iter(to_rows(rows))
                    .chain(stream::once(async { Err(anyhow!("connection reset")) }))
                    .boxed(),
                Some(Reply::Hang(rows)) => stream::iter(to_rows(rows))
                    .chain(stream::pending())
                    .boxed(),
                Some(Reply::Fail) | None => {
                    stream::once(async { Err(anyhow!("syntax error")) }).boxed()
                }
            }
        }

        fn interrupt(&self) {
            self.interrupted.fetch_add(1, Ordering::SeqCst);
        }

        fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    const TWO_ROWS: &[&[(&str, &str)]] = &[&[("v", "1")], &[("v", "2")]];

    fn gauge_collect(query: &str) -> CollectDefinition {
        CollectDefinition::new(query).with_metric(MetricDefinition::new("m", "gauge", "v"))
    }

    fn engine(connector: FakeConnector, collects: Vec<CollectDefinition>) -> ScrapeEngine {
        let connectors = Connectors::empty().with(BackendType::Postgres, connector);
        ScrapeEngine::new(
            Arc::new(connectors),
            collects.into(),
            ScrapeSettings::default(),
        )
    }

    fn instance(name: &str) -> Instance {
        Instance::new(name, BackendType::Postgres, "postgres://localhost/db")
    }

    #[tokio::test]
    async fn test_healthy_instance() {
        let connector = FakeConnector::new(&[("q", Reply::Rows(TWO_ROWS))]);
        let closed = Arc::clone(&connector.closed);
        let engine = engine(connector, vec![gauge_collect("q")]);

        let (samples, status) = engine.scrape_instance(&instance("A")).await;

        assert!(status.success);
        assert_eq!(status.instance, "A");
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].kind, MetricKind::Gauge);
        assert_eq!(samples[0].labels, vec!["A"]);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let connector =
            FakeConnector::new(&[("q", Reply::Rows(TWO_ROWS))]).with("B", Behavior::RefuseConnect);
        let engine = engine(connector, vec![gauge_collect("q")]);

        let (samples, status) = engine.scrape_instance(&instance("B")).await;
        assert!(!status.success);
        assert!(samples.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let connector =
            FakeConnector::new(&[("q", Reply::Rows(TWO_ROWS))]).with("slow", Behavior::HangConnect);
        let engine = engine(connector, vec![gauge_collect("q")]);

        let (samples, status) = engine.scrape_instance(&instance("slow")).await;
        assert!(!status.success);
        assert!(samples.is_empty());
    }

    #[tokio::test]
    async fn test_ping_failure_runs_no_queries_and_closes() {
        let connector =
            FakeConnector::new(&[("q", Reply::Rows(TWO_ROWS))]).with("A", Behavior::FailPing);
        let closed = Arc::clone(&connector.closed);
        let engine = engine(connector, vec![gauge_collect("q")]);

        let (samples, status) = engine.scrape_instance(&instance("A")).await;
        assert!(!status.success);
        assert!(samples.is_empty());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_query_is_skipped() {
        let connector = FakeConnector::new(&[
            ("bad", Reply::Fail),
            ("good", Reply::Rows(TWO_ROWS)),
        ]);
        let engine = engine(connector, vec![gauge_collect("bad"), gauge_collect("good")]);

        let (samples, status) = engine.scrape_instance(&instance("A")).await;
        assert!(status.success);
        assert_eq!(samples.len(), 2);
    }

    #[tokio::test]
    async fn test_mid_stream_error_keeps_rows_read() {
        let connector = FakeConnector::new(&[
            ("partial", Reply::FailAfter(TWO_ROWS)),
            ("good", Reply::Rows(&[&[("v", "9")]])),
        ]);
        let engine = engine(
            connector,
            vec![gauge_collect("partial"), gauge_collect("good")],
        );

        let (samples, status) = engine.scrape_instance(&instance("A")).await;
        assert!(status.success);
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 9.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_timeout_keeps_rows_read() {
        let connector = FakeConnector::new(&[
            ("slow", Reply::Hang(&[&[("v", "5")]])),
            ("good", Reply::Rows(&[&[("v", "7")]])),
        ]);
        let (connects, interrupted, closed) = (
            Arc::clone(&connector.connects),
            Arc::clone(&connector.interrupted),
            Arc::clone(&connector.closed),
        );
        let collects = vec![
            gauge_collect("slow").with_timeout(Duration::from_secs(2)),
            gauge_collect("good"),
        ];
        let engine = engine(connector, collects);

        let (samples, status) = engine.scrape_instance(&instance("A")).await;
        assert!(status.success);
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![5.0, 7.0]);

        // the timed-out connection is interrupted and replaced, not closed
        assert_eq!(interrupted.load(Ordering::SeqCst), 1);
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_on_last_query_does_not_reconnect() {
        let connector = FakeConnector::new(&[
            ("good", Reply::Rows(&[&[("v", "7")]])),
            ("slow", Reply::Hang(&[])),
        ]);
        let (connects, closed) = (Arc::clone(&connector.connects), Arc::clone(&connector.closed));
        let engine = engine(connector, vec![gauge_collect("good"), gauge_collect("slow")]);

        let (samples, status) = engine.scrape_instance(&instance("A")).await;
        assert!(status.success);
        assert_eq!(samples.len(), 1);
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reconnect_skips_remaining_queries() {
        let connector = FakeConnector::new(&[
            ("slow", Reply::Hang(&[&[("v", "5")]])),
            ("good", Reply::Rows(&[&[("v", "7")]])),
        ])
        .with("A", Behavior::RefuseReconnect);
        let engine = engine(
            connector,
            vec![gauge_collect("slow"), gauge_collect("good"), gauge_collect("good")],
        );

        let (samples, status) = engine.scrape_instance(&instance("A")).await;
        assert!(status.success);
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![5.0]);
    }

    #[tokio::test]
    async fn test_sqlite_timeout_does_not_block_next_query() {
        let engine = ScrapeEngine::new(
            Arc::new(Connectors::default()),
            vec![
                gauge_collect(
                    "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c \
                     WHERE x < 200000000) SELECT count(*) AS v FROM c",
                )
                .with_timeout(Duration::from_secs(1)),
                gauge_collect("SELECT 7 AS v"),
            ]
            .into(),
            ScrapeSettings::default(),
        );
        let mem = Instance::new("mem", BackendType::Sqlite, "sqlite::memory:");

        let start = std::time::Instant::now();
        let (samples, status) = engine.scrape_instance(&mem).await;
        let elapsed = start.elapsed();

        assert!(status.success);
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![7.0]);
        assert!(elapsed < Duration::from_millis(2500), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_unsupported_backend() {
        let engine = engine(FakeConnector::new(&[]), vec![gauge_collect("q")]);
        let mssql = Instance::new("legacy", BackendType::Mssql, "sqlserver://localhost");

        let (samples, status) = engine.scrape_instance(&mssql).await;
        assert!(!status.success);
        assert!(samples.is_empty());
    }

    #[tokio::test]
    async fn test_one_status_per_instance_in_order() {
        let connector = FakeConnector::new(&[("q", Reply::Rows(TWO_ROWS))])
            .with("B", Behavior::RefuseConnect)
            .with("C", Behavior::FailPing);
        let engine = engine(connector, vec![gauge_collect("q")]);
        let instances = vec![instance("A"), instance("B"), instance("C"), instance("D")];

        let batch = engine.scrape(&instances).await;

        let statuses: Vec<(&str, bool)> = batch
            .statuses
            .iter()
            .map(|s| (s.instance.as_str(), s.success))
            .collect();
        assert_eq!(
            statuses,
            vec![("A", true), ("B", false), ("C", false), ("D", true)]
        );
        assert_eq!(batch.samples.len(), 4);
        assert_eq!(batch.failed_instances(), 2);
    }

    #[tokio::test]
    async fn test_empty_partition() {
        let engine = engine(FakeConnector::new(&[]), vec![gauge_collect("q")]);
        let batch = engine.scrape(&[]).await;
        assert_eq!(batch, Batch::default());
    }

    #[tokio::test]
    async fn test_each_row_maps_every_metric() {
        let connector = FakeConnector::new(&[(
            "q",
            Reply::Rows(&[&[("db", "prod"), ("cnt", "42"), ("size", "10")]]),
        )]);
        let collect = CollectDefinition::new("q")
            .with_metric(MetricDefinition::new("rows_total", "counter", "cnt").with_labels(["db"]))
            .with_metric(MetricDefinition::new("size", "gauge", "size"))
            .with_metric(MetricDefinition::new("latency", "histogram", "cnt"));
        let engine = engine(connector, vec![collect]);

        let (samples, _) = engine.scrape_instance(&instance("i1")).await;
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].key, "rows_total");
        assert_eq!(samples[0].labels, vec!["prod", "i1"]);
        assert_eq!(samples[1].key, "size");
    }
}
