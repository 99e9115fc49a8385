//! Exporter configuration, loaded once at startup and read-only afterwards.
//!
//! Two YAML documents, in the same layout the exporter has always used:
//!
//! `config-database.yml` maps group names to named instances:
//!
//! ```yaml
//! shop:
//!   primary:
//!     type: postgres
//!     dsn: postgres://localhost:5432/shop
//!     user: exporter
//!     password: ${SHOP_PASSWORD}
//! ```
//!
//! `config-metrics.yml` maps endpoint paths to the groups they scrape and the
//! queries they run:
//!
//! ```yaml
//! metrics:
//!   targets: [shop]
//!   collects:
//!     - query: SELECT datname, numbackends FROM pg_stat_database
//!       timeout: 2
//!       metrics:
//!         backends:
//!           type: gauge
//!           description: Backends per database
//!           labels: [datname]
//!           value: numbackends
//! ```

mod database;
mod env;
mod error;
mod metrics;

pub use database::{BackendType, Instance, InstanceGroups, parse_groups};
pub use env::expand_env_vars;
pub use error::ConfigError;
pub use metrics::{
    CollectDefinition, EndpointConfig, MetricDefinition, parse_endpoints, timeout_from_secs,
};

use std::path::Path;

/// Everything loaded from the two configuration files.
#[derive(Clone, Debug)]
pub struct ExporterConfig {
    pub groups: InstanceGroups,
    pub endpoints: Vec<EndpointConfig>,
}

impl ExporterConfig {
    /// Read and parse both configuration files.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or does not parse.
    pub fn load(database: &Path, metrics: &Path) -> Result<Self, ConfigError> {
        let groups = parse_groups(&read(database)?, database)?;
        let endpoints = parse_endpoints(&read(metrics)?, metrics)?;

        Ok(Self { groups, endpoints })
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
