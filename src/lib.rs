//! Export the results of configured SQL queries as Prometheus metrics.

pub mod cli;
pub mod collectors;
pub mod config;
pub mod exporter;
