use crate::{
    cli::actions::Action,
    collectors::{ExporterSettings, ScrapeSettings},
};
use anyhow::{Result, anyhow};
use clap::ArgMatches;
use std::{num::NonZeroUsize, path::PathBuf, time::Duration};

/// Turn parsed arguments into the action to run.
///
/// # Errors
///
/// Returns an error if a required argument is missing.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    // Get the port or return an error
    let port = matches
        .get_one::<u16>("port")
        .copied()
        .ok_or_else(|| anyhow!("Port is required. Please provide it using the --port flag."))?;

    // Get the listen address (None means auto-detect)
    let listen = matches.get_one::<String>("listen").cloned();

    let database_config = path(matches, "config-database")?;
    let metrics_config = path(matches, "config-metrics")?;

    Ok(Action::Run {
        port,
        listen,
        database_config,
        metrics_config,
        settings: settings(matches)?,
    })
}

fn path(matches: &ArgMatches, name: &str) -> Result<PathBuf> {
    matches
        .get_one::<PathBuf>(name)
        .cloned()
        .ok_or_else(|| anyhow!("--{name} is required"))
}

fn seconds(matches: &ArgMatches, name: &str) -> Result<Duration> {
    matches
        .get_one::<u64>(name)
        .copied()
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow!("--{name} is required"))
}

fn string(matches: &ArgMatches, name: &str) -> String {
    matches.get_one::<String>(name).cloned().unwrap_or_default()
}

/// Exporter settings from the `--threads`, timeout and naming flags.
///
/// # Errors
///
/// Returns an error if a required argument is missing.
pub fn settings(matches: &ArgMatches) -> Result<ExporterSettings> {
    let partitions = matches
        .get_one::<NonZeroUsize>("threads")
        .copied()
        .ok_or_else(|| anyhow!("--threads is required"))?;

    Ok(ExporterSettings {
        namespace: string(matches, "namespace"),
        subsystem: string(matches, "subsystem"),
        partitions,
        scrape: ScrapeSettings {
            connect_timeout: seconds(matches, "connect-timeout")?,
            query_timeout: seconds(matches, "query-timeout")?,
        },
    })
}
