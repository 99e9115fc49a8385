#![allow(dead_code)]

use anyhow::Result;
use query_exporter::{
    collectors::{Connectors, Endpoint, ExporterSettings, build_endpoints},
    config::ExporterConfig,
};
use sqlx::{Connection, SqliteConnection};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// A throwaway sqlite database plus the two config files pointing at it.
pub struct Fixture {
    pub dir: TempDir,
    pub database_config: PathBuf,
    pub metrics_config: PathBuf,
}

impl Fixture {
    pub fn load(&self) -> Result<ExporterConfig> {
        Ok(ExporterConfig::load(
            &self.database_config,
            &self.metrics_config,
        )?)
    }

    pub fn endpoints(&self) -> Result<Vec<Arc<Endpoint>>> {
        build_endpoints(
            &self.load()?,
            &ExporterSettings::default(),
            Connectors::default(),
        )
    }
}

const METRICS_CONFIG: &str = r"
metrics:
  targets: [shop]
  collects:
    - query: SELECT db, cnt, size FROM orders ORDER BY db
      metrics:
        orders_total:
          type: counter
          description: Orders per database
          labels: [db]
          value: cnt
        orders_size:
          type: gauge
          labels: [db]
          value: size
    - query: SELECT * FROM missing_table
      metrics:
        never:
          type: gauge
          value: v
    - query: SELECT 1 AS one
      timeout: 2
      metrics:
        alive:
          type: gauge
          value: one
";

async fn create_database(path: &Path) -> Result<()> {
    let mut conn =
        SqliteConnection::connect(&format!("sqlite://{}?mode=rwc", path.display())).await?;

    sqlx::query("CREATE TABLE orders (db TEXT NOT NULL, cnt INTEGER NOT NULL, size REAL)")
        .execute(&mut conn)
        .await?;
    sqlx::query("INSERT INTO orders VALUES ('prod', 42, 1.5), ('staging', 7, NULL)")
        .execute(&mut conn)
        .await?;

    conn.close().await?;
    Ok(())
}

/// Instance `primary` is a real sqlite file, `broken` points at a file that
/// does not exist.
pub async fn fixture() -> Result<Fixture> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("shop.db");
    create_database(&db_path).await?;

    let database_config = dir.path().join("config-database.yml");
    fs::write(
        &database_config,
        format!(
            "shop:\n  primary:\n    type: sqlite\n    dsn: sqlite://{}\n  broken:\n    type: sqlite3\n    dsn: sqlite://{}\n",
            db_path.display(),
            dir.path().join("missing").join("nope.db").display(),
        ),
    )?;

    let metrics_config = dir.path().join("config-metrics.yml");
    fs::write(&metrics_config, METRICS_CONFIG)?;

    Ok(Fixture {
        dir,
        database_config,
        metrics_config,
    })
}

/// Start the exporter for `fixture` in the background.
pub async fn spawn_exporter(
    fixture: &Fixture,
    listen: Option<String>,
) -> Result<(u16, JoinHandle<Result<()>>)> {
    let port = get_available_port();
    let endpoints = fixture.endpoints()?;

    let handle =
        tokio::spawn(async move { query_exporter::exporter::new(port, listen, endpoints).await });

    Ok((port, handle))
}

/// Find an available port for testing (returns port > 1024)
pub fn get_available_port() -> u16 {
    use std::net::TcpListener;

    // Bind to port 0 lets the OS assign an available ephemeral port
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
    let port = listener
        .local_addr()
        .expect("Failed to get local addr")
        .port();

    assert!(port > 1024, "Assigned port {} should be > 1024", port);

    port
}

/// Wait for server to be ready on the given port
pub async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    use tokio::time::{Duration, sleep};

    for _ in 0..max_attempts {
        if tokio::net::TcpStream::connect(format!("localhost:{}", port))
            .await
            .is_ok()
        {
            return true;
        }

        sleep(Duration::from_millis(100)).await;
    }

    eprintln!(
        "Failed to connect to server on port {} after {} attempts",
        port, max_attempts
    );
    false
}

/// Get base URL for test server
pub fn get_test_url(port: u16) -> String {
    format!("http://localhost:{}", port)
}
